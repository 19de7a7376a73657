use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    Credit,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Pending,
    Cancelled,
    Returned,
    PartialReturn,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Sale {
    pub id: u64,
    #[schema(example = "RCP1767254400000")]
    pub receipt_number: String,
    pub pos_transaction_id: Option<String>,
    pub location_id: u64,
    pub customer_id: Option<u64>,
    pub staff_id: u64,
    pub staff_name: String,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub change_amount: f64,
    #[schema(example = "cash")]
    pub payment_method: String,
    #[schema(example = "completed")]
    pub status: String,
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SaleItem {
    pub id: u64,
    pub sale_id: u64,
    pub product_id: u64,
    pub product_name: String,
    pub sku: String,
    pub category: String,
    pub quantity: i64,
    pub returned_quantity: i64,
    pub unit_price: f64,
    pub cost_price: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_price: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}
