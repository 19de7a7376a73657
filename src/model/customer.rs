use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustomerStatus {
    Lead,
    Active,
    Inactive,
    Blocked,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogType {
    Call,
    Email,
    Meeting,
    Note,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Customer {
    pub id: u64,
    #[schema(example = "Acme Traders")]
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[schema(example = "lead")]
    pub status: String,
    /// Comma separated
    pub tags: String,
    pub notes: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_contacted_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CrmLog {
    pub id: u64,
    pub customer_id: u64,
    pub author_id: Option<u64>,
    pub log_type: String,
    pub content: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}
