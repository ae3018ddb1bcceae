use budget_core::{Budget, Category, DashboardState, Expense, ExpenseFilter, ExpenseId};
use criterion::{criterion_group, criterion_main, Criterion};
use time::macros::date;
use time::Duration;

fn mk_expense(index: usize) -> Expense {
    let category = Category::ALL[index % Category::ALL.len()];
    let offset = i64::try_from(index % 730).unwrap_or(0);
    Expense {
        id: ExpenseId::new(),
        category,
        description: format!("bench expense {index}"),
        amount: i64::try_from(index).unwrap_or(0) * 1_000,
        date: date!(2023 - 01 - 01) + Duration::days(offset),
        notes: String::new(),
        created_at: None,
    }
}

fn bench_dashboard(c: &mut Criterion) {
    let expenses = (0..10_000).map(mk_expense).collect::<Vec<_>>();
    let mut state = DashboardState::new();
    state.load_live(expenses, Budget::default());

    let unfiltered = ExpenseFilter::default();
    let filtered =
        ExpenseFilter { category: Some(Category::Interior), month: "2024-02".parse().ok() };

    c.bench_function("dashboard_render_10k_unfiltered", |b| {
        b.iter(|| state.render(&unfiltered));
    });
    c.bench_function("dashboard_render_10k_filtered", |b| {
        b.iter(|| state.render(&filtered));
    });
}

criterion_group!(benches, bench_dashboard);
criterion_main!(benches);
