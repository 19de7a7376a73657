use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementType {
    StockIn,
    StockOut,
    Transfer,
    Adjustment,
    Sale,
    Return,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StockMovement {
    pub id: u64,
    pub uuid: Option<String>,
    pub product_id: u64,
    #[schema(example = "stock_in")]
    pub movement_type: String,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    pub quantity: i64,
    pub unit_cost: f64,
    pub total_value: f64,
    pub reference: String,
    pub reason: String,
    pub created_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StockTransfer {
    pub id: u64,
    pub uuid: Option<String>,
    #[schema(example = "TRF-20260101-0001")]
    pub transfer_number: String,
    pub from_location_id: u64,
    pub to_location_id: u64,
    pub status: String,
    pub notes: String,
    pub requested_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StockTransferItem {
    pub id: u64,
    pub transfer_id: u64,
    pub product_id: u64,
    pub quantity: i64,
    pub unit_cost: f64,
    pub total_value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferWithItems {
    #[serde(flatten)]
    pub transfer: StockTransfer,
    pub items: Vec<StockTransferItem>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockTakeStatus {
    Draft,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StockTake {
    pub id: u64,
    pub uuid: Option<String>,
    pub reference: String,
    pub location_id: u64,
    pub status: String,
    pub notes: String,
    pub counted_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StockTakeItem {
    pub id: u64,
    pub stock_take_id: u64,
    pub product_id: u64,
    pub system_quantity: i64,
    pub physical_quantity: i64,
    pub difference: i64,
    pub unit_cost: f64,
    pub adjustment_value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockTakeWithItems {
    #[serde(flatten)]
    pub stock_take: StockTake,
    pub items: Vec<StockTakeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CashSession {
    pub id: u64,
    pub location_id: u64,
    #[schema(value_type = String, format = "date")]
    pub business_date: NaiveDate,
    pub opening_balance: f64,
    pub cash_sales: f64,
    pub cash_received: f64,
    pub change_given: f64,
    pub cash_paid_out: f64,
    pub expected_in_drawer: f64,
    pub actual_cash: f64,
    pub variance: f64,
    pub closed_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub closed_at: NaiveDateTime,
}
