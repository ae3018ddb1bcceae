use std::path::PathBuf;

use budget_core::{Budget, Expense, ExpenseId, NewExpense, ValidationError};
use budget_store_sqlite::{SchemaStatus, SqliteStore, TABLES};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Missing expense id")]
    MissingId,
    #[error("Expense not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub message: String,
    pub tables: Vec<String>,
    pub schema_version: i64,
    pub budget_seeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetUpdated {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedExpense {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub expense: Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedExpense {
    pub success: bool,
    pub message: String,
    #[serde(rename = "deletedExpense")]
    pub deleted_expense: Expense,
}

#[derive(Debug, Clone)]
pub struct BudgetApi {
    db_path: PathBuf,
}

impl BudgetApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> ApiResult<SqliteStore> {
        Ok(SqliteStore::open(&self.db_path)?)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> ApiResult<SchemaStatus> {
        let store = self.open_store()?;
        Ok(store.schema_status()?)
    }

    /// Create both tables when absent and seed the default budget row into an empty table.
    ///
    /// # Errors
    /// Returns an error when a migration step or the seed insert fails.
    pub fn migrate(&self) -> ApiResult<MigrateResult> {
        let mut store = self.open_store()?;
        let report = store.migrate()?;
        Ok(MigrateResult {
            message: "Database migrated successfully".to_string(),
            tables: TABLES.iter().map(ToString::to_string).collect(),
            schema_version: report.schema_version,
            budget_seeded: report.budget_seeded,
        })
    }

    /// Read the budget row; the first read on an empty table persists the defaults.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read or written.
    pub fn budget(&self) -> ApiResult<Budget> {
        let mut store = self.open_store()?;
        Ok(store.budget_or_default()?)
    }

    /// Overwrite all five budget fields.
    ///
    /// # Errors
    /// Returns an error when the store write fails.
    pub fn replace_budget(&self, budget: Budget) -> ApiResult<BudgetUpdated> {
        let mut store = self.open_store()?;
        store.replace_budget(&budget)?;
        Ok(BudgetUpdated { success: true, message: "Budget updated successfully".to_string() })
    }

    /// List every expense, most recent date first.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn list_expenses(&self) -> ApiResult<Vec<Expense>> {
        let store = self.open_store()?;
        Ok(store.list_expenses()?)
    }

    /// Assign a fresh id and creation time to a validated expense and persist it.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub fn create_expense(&self, input: NewExpense) -> ApiResult<CreatedExpense> {
        let mut store = self.open_store()?;
        let now = OffsetDateTime::now_utc();
        let created_at = now.replace_nanosecond(0).unwrap_or(now);
        let expense = input.into_expense(ExpenseId::new(), created_at);
        store.insert_expense(&expense)?;
        Ok(CreatedExpense {
            success: true,
            message: "Expense added successfully".to_string(),
            expense,
        })
    }

    /// Delete an expense by id. A blank or absent id never reaches the store.
    ///
    /// # Errors
    /// Returns [`ApiError::MissingId`] for a blank id, [`ApiError::NotFound`] when no
    /// row matched, and [`ApiError::Store`] when the delete fails.
    pub fn delete_expense(&self, id: Option<&str>) -> ApiResult<DeletedExpense> {
        let id = match id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(ApiError::MissingId),
        };

        let mut store = self.open_store()?;
        match store.delete_expense(id)? {
            Some(deleted_expense) => Ok(DeletedExpense {
                success: true,
                message: "Expense deleted successfully".to_string(),
                deleted_expense,
            }),
            None => Err(ApiError::NotFound(id.to_string())),
        }
    }
}
