use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Starter charts of accounts, picked by the kind of business.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Industry {
    Retail,
    Service,
    Pharmacy,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Account {
    pub id: u64,
    #[schema(example = "1000")]
    pub code: String,
    #[schema(example = "Cash on Hand")]
    pub name: String,
    #[schema(example = "asset")]
    pub account_type: String,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct JournalEntry {
    pub id: u64,
    #[schema(value_type = String, format = "date")]
    pub entry_date: NaiveDate,
    pub description: String,
    #[schema(example = "RCP1767254400000")]
    pub reference: String,
    pub location_id: Option<u64>,
    pub created_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LedgerLine {
    pub id: u64,
    pub entry_id: u64,
    pub account_id: u64,
    pub debit: f64,
    pub credit: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JournalEntryWithLines {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub lines: Vec<LedgerLine>,
}
