use budget_core::{
    format_currency, Category, CategoryProgress, Dashboard, DataSource, ExpenseTable, Summary,
};

const STYLE: &str = r"
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 960px; color: #1f2933; }
.notice { background: #fff4e5; border: 1px solid #f0b429; }
.notice { padding: .75rem 1rem; margin-bottom: 1rem; }
.cards { display: grid; grid-template-columns: repeat(4, 1fr); gap: 1rem; }
.card { border: 1px solid #d9e2ec; border-radius: 6px; padding: .75rem; }
.card .value { font-size: 1.25rem; font-weight: 600; }
.negative { color: #ba2525; }
.bar { background: #e4e7eb; height: .75rem; border-radius: 4px; overflow: hidden; }
.bar .fill { background: #2f80ed; height: 100%; }
.bar .fill.warning { background: #e12d39; }
table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
th, td { text-align: left; padding: .4rem; border-bottom: 1px solid #e4e7eb; }
td.amount { text-align: right; }
td.placeholder { text-align: center; color: #7b8794; }
";

/// Render the dashboard as a standalone HTML document.
pub fn render_page(dashboard: &Dashboard) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Household Budget</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<h1>Household Budget</h1>\n");

    if let Some(notice) = &dashboard.notice {
        html.push_str(&format!(
            "<div class=\"notice\" data-source=\"{}\">{}</div>\n",
            source_name(dashboard.data_source),
            escape(notice)
        ));
    }

    push_summary(&mut html, &dashboard.summary, dashboard.budget.total);
    push_categories(&mut html, &dashboard.categories);
    push_filter_form(&mut html, dashboard);
    push_table(&mut html, &dashboard.table);

    html.push_str("</body>\n</html>\n");
    html
}

/// Minimal page for a rejected filter query.
pub fn render_error(message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n\
        <head><meta charset=\"utf-8\"><title>Household Budget</title></head>\n<body>\n\
        <h1>Household Budget</h1>\n<p class=\"error\">{}</p>\n\
        <p><a href=\"/\">Clear filters</a></p>\n</body>\n</html>\n",
        escape(message)
    )
}

fn source_name(source: DataSource) -> &'static str {
    match source {
        DataSource::Live => "live",
        DataSource::Sample => "sample",
    }
}

fn push_summary(html: &mut String, summary: &Summary, total_budget: i64) {
    let remaining_class = if summary.remaining < 0 { "value negative" } else { "value" };
    html.push_str("<section class=\"cards\">\n");
    push_card(html, "Total budget", "value", &format_currency(total_budget));
    push_card(html, "Spent", "value", &format_currency(summary.total_spent));
    push_card(html, "Remaining", remaining_class, &format_currency(summary.remaining));
    push_card(
        html,
        "Transactions",
        "value",
        &format!(
            "{} (avg {})",
            summary.transaction_count,
            format_currency(summary.average_amount)
        ),
    );
    html.push_str("</section>\n");
}

fn push_card(html: &mut String, title: &str, class: &str, value: &str) {
    html.push_str(&format!(
        "<div class=\"card\"><div class=\"title\">{}</div><div class=\"{class}\">{}</div></div>\n",
        escape(title),
        escape(value)
    ));
}

fn push_categories(html: &mut String, categories: &[CategoryProgress]) {
    html.push_str("<section class=\"categories\">\n<h2>Categories</h2>\n");
    for progress in categories {
        let fill_class = if progress.warning { "fill warning" } else { "fill" };
        let percentage = progress
            .percentage
            .map_or_else(|| "n/a".to_string(), |value| format!("{value:.1}%"));
        html.push_str(&format!(
            "<div class=\"category\" data-category=\"{}\">\n\
            <div>{} <span class=\"label\">{}</span> <span class=\"percentage\">{}</span></div>\n\
            <div class=\"bar\"><div class=\"{fill_class}\" style=\"width: {:.1}%\"></div></div>\n\
            </div>\n",
            progress.category.as_str(),
            escape(progress.category.label()),
            escape(&progress.label),
            percentage,
            progress.bar_width
        ));
    }
    html.push_str("</section>\n");
}

fn push_filter_form(html: &mut String, dashboard: &Dashboard) {
    html.push_str(
        "<form method=\"get\" action=\"/\" class=\"filters\">\n<select name=\"category\">\n",
    );
    html.push_str("<option value=\"\">All categories</option>\n");
    for category in Category::ALL {
        let selected = if dashboard.filter.category == Some(category) { " selected" } else { "" };
        html.push_str(&format!(
            "<option value=\"{}\"{selected}>{}</option>\n",
            category.as_str(),
            escape(category.label())
        ));
    }
    let month = dashboard.filter.month.map(|month| month.to_string()).unwrap_or_default();
    html.push_str(&format!(
        "</select>\n<input type=\"month\" name=\"month\" value=\"{month}\">\n\
        <button type=\"submit\">Filter</button>\n</form>\n"
    ));
}

fn push_table(html: &mut String, table: &ExpenseTable) {
    html.push_str(
        "<table class=\"expenses\">\n\
        <thead><tr><th>Date</th><th>Category</th><th>Description</th>\
        <th>Notes</th><th>Amount</th></tr></thead>\n\
        <tbody>\n",
    );
    if let Some(placeholder) = &table.placeholder {
        html.push_str(&format!(
            "<tr><td class=\"placeholder\" colspan=\"5\">{}</td></tr>\n",
            escape(placeholder)
        ));
    }
    for row in &table.rows {
        html.push_str(&format!(
            "<tr data-id=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
            <td class=\"amount\">{}</td></tr>\n",
            escape(&row.id),
            escape(&row.date),
            escape(&row.category_label),
            escape(&row.description),
            escape(&row.notes),
            escape(&row.amount_display)
        ));
    }
    html.push_str("</tbody>\n</table>\n");
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
