use serde::{Deserialize, Serialize};

use crate::{render_dashboard, sample_expenses, Budget, Dashboard, Expense, ExpenseFilter};

pub const SAMPLE_DATA_NOTICE: &str = "Backend unavailable; showing sample data";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Rendered,
    Degraded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Sample,
}

/// Everything a dashboard renderer needs, changed only through the methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    phase: Phase,
    expenses: Vec<Expense>,
    budget: Budget,
    notice: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardState {
    #[must_use]
    pub fn new() -> Self {
        Self { phase: Phase::Idle, expenses: Vec::new(), budget: Budget::default(), notice: None }
    }

    pub fn begin_loading(&mut self) {
        self.phase = Phase::Loading;
    }

    pub fn load_live(&mut self, expenses: Vec<Expense>, budget: Budget) {
        self.phase = Phase::Rendered;
        self.expenses = expenses;
        self.budget = budget;
        self.notice = None;
    }

    /// Switch to the fixed sample data set with the default budget.
    pub fn load_sample(&mut self) {
        self.phase = Phase::Degraded;
        self.expenses = sample_expenses();
        self.budget = Budget::default();
        self.notice = Some(SAMPLE_DATA_NOTICE.to_string());
    }

    /// Replace the expense list after a round trip; the phase is left alone.
    pub fn replace_expenses(&mut self, expenses: Vec<Expense>) {
        self.expenses = expenses;
    }

    pub fn set_budget(&mut self, budget: Budget) {
        self.budget = budget;
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn source(&self) -> DataSource {
        if self.phase == Phase::Degraded {
            DataSource::Sample
        } else {
            DataSource::Live
        }
    }

    #[must_use]
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    #[must_use]
    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    #[must_use]
    pub fn render(&self, filter: &ExpenseFilter) -> Dashboard {
        render_dashboard(self, filter)
    }
}
