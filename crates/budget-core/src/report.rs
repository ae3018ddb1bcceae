use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Budget, Category, DataSource, DashboardState, Expense, Phase, YearMonth};

/// Categories spending more than this share of their allocation are flagged.
pub const WARNING_THRESHOLD_PERCENT: f64 = 90.0;

pub const EMPTY_TABLE_PLACEHOLDER: &str = "No expenses match the current filters";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub total_spent: i64,
    /// `budget.total - total_spent`; negative once the budget is overrun.
    pub remaining: i64,
    pub transaction_count: usize,
    pub average_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryProgress {
    pub category: Category,
    pub spent: i64,
    pub allocated: i64,
    /// Unclamped `spent / allocated * 100`; absent when nothing was allocated.
    pub percentage: Option<f64>,
    /// Progress bar fill in percent, clamped to `0..=100`.
    pub bar_width: f64,
    pub warning: bool,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpenseFilter {
    pub category: Option<Category>,
    pub month: Option<YearMonth>,
}

impl ExpenseFilter {
    #[must_use]
    pub fn matches(&self, expense: &Expense) -> bool {
        self.category.map_or(true, |category| expense.category == category)
            && self.month.map_or(true, |month| month.contains(expense.date))
    }

    /// Matching expenses, most recent date first.
    #[must_use]
    pub fn apply<'a>(&self, expenses: &'a [Expense]) -> Vec<&'a Expense> {
        let mut selected =
            expenses.iter().filter(|expense| self.matches(expense)).collect::<Vec<_>>();
        selected.sort_by(|lhs, rhs| newest_first(lhs, rhs));
        selected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRow {
    pub id: String,
    pub date: String,
    pub category: Category,
    pub category_label: String,
    pub description: String,
    pub notes: String,
    pub amount: i64,
    pub amount_display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpenseTable {
    pub rows: Vec<TableRow>,
    /// Set instead of rows when the filters leave nothing to show.
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub phase: Phase,
    pub data_source: DataSource,
    pub notice: Option<String>,
    pub budget: Budget,
    pub summary: Summary,
    pub categories: Vec<CategoryProgress>,
    pub filter: ExpenseFilter,
    pub table: ExpenseTable,
}

fn newest_first(lhs: &Expense, rhs: &Expense) -> Ordering {
    rhs.date.cmp(&lhs.date)
}

/// Sums in `i128` so any realistic number of `i64` amounts fits exactly.
fn sum_amounts<'a>(expenses: impl Iterator<Item = &'a Expense>) -> i128 {
    expenses.map(|expense| i128::from(expense.amount)).sum()
}

/// Narrow back to `i64`, pinning out-of-range values to the nearest bound.
fn clamp_to_i64(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[must_use]
pub fn spent_in(expenses: &[Expense], category: Category) -> i64 {
    clamp_to_i64(sum_amounts(expenses.iter().filter(|expense| expense.category == category)))
}

#[must_use]
pub fn summarize(expenses: &[Expense], budget: &Budget) -> Summary {
    let total = sum_amounts(expenses.iter());
    let transaction_count = expenses.len();
    let average = match i128::try_from(transaction_count) {
        Ok(count) if count > 0 => (total + count / 2) / count,
        _ => 0,
    };

    Summary {
        total_spent: clamp_to_i64(total),
        remaining: clamp_to_i64(i128::from(budget.total) - total),
        transaction_count,
        average_amount: clamp_to_i64(average),
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn category_progress(expenses: &[Expense], budget: &Budget) -> Vec<CategoryProgress> {
    Category::ALL
        .iter()
        .map(|&category| {
            let spent = spent_in(expenses, category);
            let allocated = budget.allocation(category);
            let percentage = (allocated != 0).then(|| spent as f64 * 100.0 / allocated as f64);
            let (bar_width, warning) = match percentage {
                Some(value) => (value.clamp(0.0, 100.0), value > WARNING_THRESHOLD_PERCENT),
                None if spent > 0 => (100.0, true),
                None => (0.0, false),
            };

            CategoryProgress {
                category,
                spent,
                allocated,
                percentage,
                bar_width,
                warning,
                label: format!("{}/{}", format_compact(spent), format_compact(allocated)),
            }
        })
        .collect()
}

#[must_use]
pub fn expense_table(expenses: &[Expense], filter: &ExpenseFilter) -> ExpenseTable {
    let rows = filter
        .apply(expenses)
        .into_iter()
        .map(|expense| TableRow {
            id: expense.id.to_string(),
            date: format_display_date(expense.date),
            category: expense.category,
            category_label: expense.category.label().to_string(),
            description: expense.description.clone(),
            notes: expense.notes.clone(),
            amount: expense.amount,
            amount_display: format_currency(expense.amount),
        })
        .collect::<Vec<_>>();

    let placeholder = rows.is_empty().then(|| EMPTY_TABLE_PLACEHOLDER.to_string());
    ExpenseTable { rows, placeholder }
}

/// Recompute every view from the current state. The summary and category bars
/// always cover all expenses; only the table honours `filter`.
#[must_use]
pub fn render_dashboard(state: &DashboardState, filter: &ExpenseFilter) -> Dashboard {
    let expenses = state.expenses();
    let budget = state.budget();
    Dashboard {
        phase: state.phase(),
        data_source: state.source(),
        notice: state.notice().map(str::to_string),
        budget: *budget,
        summary: summarize(expenses, budget),
        categories: category_progress(expenses, budget),
        filter: filter.clone(),
        table: expense_table(expenses, filter),
    }
}

/// Full currency form with dot-grouped thousands, e.g. `25.000.000 ₫`.
#[must_use]
pub fn format_currency(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped} ₫")
}

/// Compact label for progress bars: `1.5M`, `500k`, or the plain amount below 1000.
#[must_use]
pub fn format_compact(amount: i64) -> String {
    if amount >= 1_000_000 {
        let tenths = (amount.saturating_add(50_000)) / 100_000;
        format!("{}.{}M", tenths / 10, tenths % 10)
    } else if amount >= 1_000 {
        format!("{}k", (amount + 500) / 1_000)
    } else {
        amount.to_string()
    }
}

/// Day/month/year without padding, e.g. `5/2/2024`.
#[must_use]
pub fn format_display_date(date: Date) -> String {
    format!("{}/{}/{}", date.day(), u8::from(date.month()), date.year())
}
