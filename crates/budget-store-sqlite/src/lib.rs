use std::path::Path;

use anyhow::{anyhow, Context, Result};
use budget_core::{format_date, parse_date, Budget, Category, Expense, ExpenseId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

/// Row id the budget write path always targets.
const BUDGET_ROW_ID: i64 = 1;

/// Tables provisioned by the migrations, in creation order.
pub const TABLES: [&str; 2] = ["expenses", "budget"];

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS expenses (
  id TEXT PRIMARY KEY,
  category TEXT NOT NULL CHECK (category IN ('construction','interior','garden','other')),
  description TEXT NOT NULL,
  amount INTEGER NOT NULL CHECK (amount >= 0),
  date TEXT NOT NULL,
  notes TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS budget (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  total INTEGER NOT NULL,
  construction INTEGER NOT NULL,
  interior INTEGER NOT NULL,
  garden INTEGER NOT NULL,
  other INTEGER NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);
";

const EXPENSE_COLUMNS: &str = "id, category, description, amount, date, notes, created_at";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub schema_version: i64,
    pub applied_versions: Vec<i64>,
    pub budget_seeded: bool,
}

impl SqliteStore {
    /// Open a SQLite-backed budget store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Create both tables if needed and seed the default budget row into an empty
    /// budget table. Safe to run any number of times.
    ///
    /// # Errors
    /// Returns an error when a migration step or the seed insert fails.
    pub fn migrate(&mut self) -> Result<MigrationReport> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut applied_versions = Vec::new();
        if current_schema_version(&self.conn)? < 1 {
            // Tables may already exist from an earlier unversioned setup;
            // the DDL is idempotent so applying it just records the version.
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration v1")?;
            applied_versions.push(1);
        }

        let schema_version = current_schema_version(&self.conn)?;
        if schema_version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {schema_version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        let budget_seeded = self.seed_budget_if_empty()?;
        Ok(MigrationReport { schema_version, applied_versions, budget_seeded })
    }

    fn seed_budget_if_empty(&mut self) -> Result<bool> {
        let tx = self.conn.transaction().context("failed to start seed transaction")?;
        let rows = tx
            .query_row("SELECT COUNT(*) FROM budget", [], |row| row.get::<_, i64>(0))
            .context("failed to count budget rows")?;
        let seeded = rows == 0;
        if seeded {
            insert_budget(&tx, &Budget::default())?;
        }
        tx.commit().context("failed to commit seed transaction")?;
        Ok(seeded)
    }

    /// Number of rows currently in the budget table.
    ///
    /// # Errors
    /// Returns an error when the table cannot be read.
    pub fn budget_row_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM budget", [], |row| row.get::<_, i64>(0))
            .context("failed to count budget rows")
    }

    /// Load the budget row, inserting the default one first when the table is empty.
    ///
    /// # Errors
    /// Returns an error when the read or the default insert fails.
    pub fn budget_or_default(&mut self) -> Result<Budget> {
        let tx = self.conn.transaction().context("failed to start budget transaction")?;
        let existing = tx
            .query_row(
                "SELECT total, construction, interior, garden, other
                 FROM budget
                 ORDER BY id ASC
                 LIMIT 1",
                [],
                |row| {
                    Ok(Budget {
                        total: row.get(0)?,
                        construction: row.get(1)?,
                        interior: row.get(2)?,
                        garden: row.get(3)?,
                        other: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to read budget row")?;

        let budget = match existing {
            Some(budget) => budget,
            None => {
                let budget = Budget::default();
                insert_budget(&tx, &budget)?;
                tracing::info!("inserted default budget row");
                budget
            }
        };
        tx.commit().context("failed to commit budget transaction")?;
        Ok(budget)
    }

    /// Overwrite every field of the budget row.
    ///
    /// # Errors
    /// Returns an error when the upsert fails.
    pub fn replace_budget(&mut self, budget: &Budget) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO budget(id, total, construction, interior, garden, other, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   total = excluded.total,
                   construction = excluded.construction,
                   interior = excluded.interior,
                   garden = excluded.garden,
                   other = excluded.other,
                   updated_at = excluded.updated_at",
                params![
                    BUDGET_ROW_ID,
                    budget.total,
                    budget.construction,
                    budget.interior,
                    budget.garden,
                    budget.other,
                    now_rfc3339()?,
                ],
            )
            .context("failed to replace budget row")?;
        Ok(())
    }

    /// Load every expense, most recent date first.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_expenses(&self) -> Result<Vec<Expense>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {EXPENSE_COLUMNS}
                 FROM expenses
                 ORDER BY date DESC, created_at DESC, id DESC"
            ))
            .context("failed to prepare expense listing")?;

        let mut rows = stmt.query([])?;
        let mut expenses = Vec::new();
        while let Some(row) = rows.next()? {
            expenses.push(expense_from_row(row)?);
        }
        Ok(expenses)
    }

    /// Persist one expense. A missing `created_at` is stamped with the current time.
    ///
    /// # Errors
    /// Returns an error when the insert violates a constraint or fails.
    pub fn insert_expense(&mut self, expense: &Expense) -> Result<()> {
        let created_at = expense.created_at.unwrap_or_else(OffsetDateTime::now_utc);
        self.conn
            .execute(
                "INSERT INTO expenses(id, category, description, amount, date, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    expense.id.as_str(),
                    expense.category.as_str(),
                    expense.description,
                    expense.amount,
                    format_date(expense.date),
                    expense.notes,
                    rfc3339(created_at)?,
                ],
            )
            .with_context(|| format!("failed to insert expense {}", expense.id))?;
        Ok(())
    }

    /// Delete one expense and return what was removed, or `None` if no row matched.
    ///
    /// # Errors
    /// Returns an error when the delete fails or the removed row cannot be decoded.
    pub fn delete_expense(&mut self, id: &str) -> Result<Option<Expense>> {
        let mut stmt = self
            .conn
            .prepare(&format!("DELETE FROM expenses WHERE id = ?1 RETURNING {EXPENSE_COLUMNS}"))
            .context("failed to prepare expense delete")?;
        let mut rows =
            stmt.query(params![id]).with_context(|| format!("failed to delete expense {id}"))?;
        let deleted = match rows.next()? {
            Some(row) => Some(expense_from_row(row)?),
            None => None,
        };
        Ok(deleted)
    }
}

fn insert_budget(conn: &Connection, budget: &Budget) -> Result<()> {
    conn.execute(
        "INSERT INTO budget(total, construction, interior, garden, other, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            budget.total,
            budget.construction,
            budget.interior,
            budget.garden,
            budget.other,
            now_rfc3339()?,
        ],
    )
    .context("failed to insert budget row")?;
    Ok(())
}

fn expense_from_row(row: &Row<'_>) -> Result<Expense> {
    let category_raw: String = row.get(1)?;
    let date_raw: String = row.get(4)?;
    let created_at_raw: String = row.get(6)?;

    Ok(Expense {
        id: ExpenseId(row.get(0)?),
        category: Category::parse(&category_raw)
            .ok_or_else(|| anyhow!("unknown category: {category_raw}"))?,
        description: row.get(2)?,
        amount: row.get(3)?,
        date: parse_date(&date_raw).ok_or_else(|| anyhow!("invalid expense date: {date_raw}"))?,
        notes: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        created_at: Some(parse_rfc3339(&created_at_raw)?),
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
