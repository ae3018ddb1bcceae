use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};
use ulid::Ulid;

mod report;
mod sample;
mod state;

pub use report::{
    category_progress, expense_table, format_compact, format_currency, format_display_date,
    render_dashboard, spent_in, summarize, CategoryProgress, Dashboard, ExpenseFilter,
    ExpenseTable, Summary, TableRow, EMPTY_TABLE_PLACEHOLDER, WARNING_THRESHOLD_PERCENT,
};
pub use sample::sample_expenses;
pub use state::{DashboardState, DataSource, Phase, SAMPLE_DATA_NOTICE};

pub const DEFAULT_BUDGET_TOTAL: i64 = 700_000_000;
pub const DEFAULT_BUDGET_CONSTRUCTION: i64 = 300_000_000;
pub const DEFAULT_BUDGET_INTERIOR: i64 = 200_000_000;
pub const DEFAULT_BUDGET_GARDEN: i64 = 100_000_000;
pub const DEFAULT_BUDGET_OTHER: i64 = 100_000_000;

/// Violations found while turning an untyped request body into a typed input.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` must be {expected}")]
    WrongType { field: &'static str, expected: &'static str },
    #[error("field `{field}` must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: i64 },
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("unknown category `{0}`; expected one of construction, interior, garden, other")]
    UnknownCategory(String),
    #[error("invalid date `{0}`; expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl ValidationError {
    /// Name of the offending field, when the violation is tied to one.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::NotAnObject => None,
            Self::MissingField(field) | Self::EmptyField(field) => Some(field),
            Self::WrongType { field, .. } | Self::NegativeAmount { field, .. } => Some(field),
            Self::UnknownCategory(_) => Some("category"),
            Self::InvalidDate(_) => Some("date"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("unknown category `{0}`")]
    Category(String),
    #[error("invalid year-month `{0}`; expected YYYY-MM")]
    YearMonth(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Construction,
    Interior,
    Garden,
    Other,
}

impl Category {
    pub const ALL: [Self; 4] = [Self::Construction, Self::Interior, Self::Garden, Self::Other];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Interior => "interior",
            Self::Garden => "garden",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "construction" => Some(Self::Construction),
            "interior" => Some(Self::Interior),
            "garden" => Some(Self::Garden),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Human-facing name used by the dashboard renderers.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Construction => "Construction",
            Self::Interior => "Interior",
            Self::Garden => "Garden",
            Self::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| ParseError::Category(value.to_string()))
    }
}

/// Opaque expense identifier. New ids are ULIDs, but any stored text is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ExpenseId(pub String);

impl ExpenseId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExpenseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExpenseId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The single budget row: total plus one allocation per category.
///
/// The category allocations are not required to add up to `total`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct Budget {
    pub total: i64,
    pub construction: i64,
    pub interior: i64,
    pub garden: i64,
    pub other: i64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            total: DEFAULT_BUDGET_TOTAL,
            construction: DEFAULT_BUDGET_CONSTRUCTION,
            interior: DEFAULT_BUDGET_INTERIOR,
            garden: DEFAULT_BUDGET_GARDEN,
            other: DEFAULT_BUDGET_OTHER,
        }
    }
}

impl Budget {
    #[must_use]
    pub fn allocation(&self, category: Category) -> i64 {
        match category {
            Category::Construction => self.construction,
            Category::Interior => self.interior,
            Category::Garden => self.garden,
            Category::Other => self.other,
        }
    }

    /// Validate a full replacement body. Every field is required.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for the first missing, non-integer, or negative field.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;
        Ok(Self {
            total: required_amount(object, "total")?,
            construction: required_amount(object, "construction")?,
            interior: required_amount(object, "interior")?,
            garden: required_amount(object, "garden")?,
            other: required_amount(object, "other")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expense {
    pub id: ExpenseId,
    pub category: Category,
    pub description: String,
    pub amount: i64,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(default)]
    pub notes: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// A validated expense submission, before the server assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewExpense {
    pub category: Category,
    pub description: String,
    pub amount: i64,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(default)]
    pub notes: String,
}

impl NewExpense {
    /// Validate an expense submission. `notes` is optional and defaults to `""`.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] naming the first field that is missing, has the
    /// wrong type, is negative, is blank, or is outside the allowed set.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

        let category_raw = required_str(object, "category")?;
        let category = Category::parse(category_raw)
            .ok_or_else(|| ValidationError::UnknownCategory(category_raw.to_string()))?;

        let description = required_str(object, "description")?;
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyField("description"));
        }

        let amount = required_amount(object, "amount")?;

        let date_raw = required_str(object, "date")?;
        let date =
            parse_date(date_raw).ok_or_else(|| ValidationError::InvalidDate(date_raw.to_string()))?;

        let notes = match object.get("notes") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(notes)) => notes.clone(),
            Some(_) => {
                return Err(ValidationError::WrongType { field: "notes", expected: "a string" })
            }
        };

        Ok(Self { category, description: description.to_string(), amount, date, notes })
    }

    /// Attach a fresh id and creation timestamp.
    #[must_use]
    pub fn into_expense(self, id: ExpenseId, created_at: OffsetDateTime) -> Expense {
        Expense {
            id,
            category: self.category,
            description: self.description,
            amount: self.amount,
            date: self.date,
            notes: self.notes,
            created_at: Some(created_at),
        }
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    required(object, field)?
        .as_str()
        .ok_or(ValidationError::WrongType { field, expected: "a string" })
}

fn required_amount(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<i64, ValidationError> {
    let value = required(object, field)?
        .as_i64()
        .ok_or(ValidationError::WrongType { field, expected: "an integer" })?;
    if value < 0 {
        return Err(ValidationError::NegativeAmount { field, value });
    }
    Ok(value)
}

/// Parse a `YYYY-MM-DD` calendar date.
#[must_use]
pub fn parse_date(value: &str) -> Option<Date> {
    if value.len() != 10 {
        return None;
    }
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

/// Format a calendar date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    /// # Errors
    /// Propagates serializer failures.
    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*date))
    }

    /// # Errors
    /// Fails when the value is not a `YYYY-MM-DD` string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid date `{raw}`; expected YYYY-MM-DD"))
        })
    }
}

/// A calendar month filter such as `2024-02`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: Month,
}

impl YearMonth {
    #[must_use]
    pub fn contains(self, date: Date) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, u8::from(self.month))
    }
}

impl FromStr for YearMonth {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::YearMonth(value.to_string());
        let (year_raw, month_raw) = value.split_once('-').ok_or_else(invalid)?;
        if year_raw.len() != 4 || month_raw.len() != 2 {
            return Err(invalid());
        }
        let year = year_raw.parse::<i32>().map_err(|_| invalid())?;
        let month_number = month_raw.parse::<u8>().map_err(|_| invalid())?;
        let month = Month::try_from(month_number).map_err(|_| invalid())?;
        Ok(Self { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
