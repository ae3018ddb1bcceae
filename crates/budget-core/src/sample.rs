use time::macros::date;

use crate::{Category, Expense, ExpenseId};

fn sample(
    id: &str,
    category: Category,
    description: &str,
    amount: i64,
    date: time::Date,
    notes: &str,
) -> Expense {
    Expense {
        id: ExpenseId::from(id),
        category,
        description: description.to_string(),
        amount,
        date,
        notes: notes.to_string(),
        created_at: None,
    }
}

/// Fixed data shown when the backend cannot be reached.
#[must_use]
pub fn sample_expenses() -> Vec<Expense> {
    vec![
        sample(
            "1",
            Category::Construction,
            "Masonry labour",
            25_000_000,
            date!(2024 - 01 - 15),
            "Lead mason plus two helpers",
        ),
        sample(
            "2",
            Category::Construction,
            "Cement, sand and gravel",
            35_000_000,
            date!(2024 - 01 - 20),
            "Bought from the building supplier",
        ),
        sample(
            "3",
            Category::Interior,
            "Living room table and chairs",
            15_000_000,
            date!(2024 - 02 - 05),
            "",
        ),
        sample(
            "4",
            Category::Garden,
            "Plants and lawn turf",
            8_000_000,
            date!(2024 - 02 - 10),
            "10 bougainvillea, 20 m² of turf",
        ),
    ]
}
