use budget_core::{format_currency, Budget, Dashboard, DataSource, ExpenseFilter, ExpenseTable};

const BAR_CELLS: usize = 20;

pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let mut lines = Vec::new();

    match (&dashboard.data_source, &dashboard.notice) {
        (DataSource::Sample, Some(notice)) => {
            lines.push(format!("Household Budget [sample data] {notice}"));
        }
        _ => lines.push("Household Budget".to_string()),
    }

    lines.extend(budget_lines(&dashboard.budget));
    let summary = &dashboard.summary;
    lines.push(format!("Spent:        {}", format_currency(summary.total_spent)));
    lines.push(format!("Remaining:    {}", format_currency(summary.remaining)));
    lines.push(format!(
        "Transactions: {} (avg {})",
        summary.transaction_count,
        format_currency(summary.average_amount)
    ));

    lines.push(String::new());
    lines.push("Categories".to_string());
    for progress in &dashboard.categories {
        let percentage = progress
            .percentage
            .map_or_else(|| "   n/a".to_string(), |value| format!("{value:5.1}%"));
        let marker = if progress.warning { " !" } else { "" };
        lines.push(format!(
            "  {:<13} {:<15} {percentage} [{}]{marker}",
            progress.category.label(),
            progress.label,
            bar(progress.bar_width)
        ));
    }

    lines.push(String::new());
    lines.push(format!("Expenses{}", filter_suffix(&dashboard.filter)));
    lines.extend(table_lines(&dashboard.table));
    lines.join("\n")
}

pub fn render_budget(budget: &Budget) -> String {
    budget_lines(budget).join("\n")
}

pub fn render_table(table: &ExpenseTable) -> String {
    table_lines(table).join("\n")
}

fn budget_lines(budget: &Budget) -> Vec<String> {
    vec![
        format!("Total budget: {}", format_currency(budget.total)),
        format!("  Construction: {}", format_currency(budget.construction)),
        format!("  Interior:     {}", format_currency(budget.interior)),
        format!("  Garden:       {}", format_currency(budget.garden)),
        format!("  Other:        {}", format_currency(budget.other)),
    ]
}

fn table_lines(table: &ExpenseTable) -> Vec<String> {
    if let Some(placeholder) = &table.placeholder {
        return vec![format!("  ({placeholder})")];
    }
    table
        .rows
        .iter()
        .map(|row| {
            let notes =
                if row.notes.is_empty() { String::new() } else { format!(" - {}", row.notes) };
            format!(
                "  {:<10} {:<12} {:>16}  {}{notes}  [{}]",
                row.date, row.category_label, row.amount_display, row.description, row.id
            )
        })
        .collect()
}

fn filter_suffix(filter: &ExpenseFilter) -> String {
    let mut parts = Vec::new();
    if let Some(category) = filter.category {
        parts.push(format!("category={category}"));
    }
    if let Some(month) = filter.month {
        parts.push(format!("month={month}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn bar(width_percent: f64) -> String {
    let filled = ((width_percent.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), " ".repeat(BAR_CELLS - filled.min(BAR_CELLS)))
}
