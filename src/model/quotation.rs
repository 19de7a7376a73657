use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Accepted,
    Declined,
    Converted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Quotation {
    pub id: u64,
    #[schema(example = "QT-1767254400000")]
    pub quotation_number: String,
    pub customer_id: u64,
    pub location_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub expiry_date: NaiveDate,
    pub subtotal: f64,
    pub tax_total: f64,
    pub total_amount: f64,
    pub status: String,
}

/// Shared by quotation and invoice lines.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DocumentLine {
    pub id: u64,
    pub product_id: u64,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuotationWithLines {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub lines: Vec<DocumentLine>,
}
