use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::quotation::DocumentLine;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Invoice {
    pub id: u64,
    #[schema(example = "INV-1767254400000")]
    pub invoice_number: String,
    pub customer_id: u64,
    pub location_id: u64,
    pub quotation_id: Option<u64>,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub due_date: NaiveDate,
    pub subtotal: f64,
    pub tax_total: f64,
    pub total_amount: f64,
    pub amount_paid: f64,
    pub status: String,
}

impl Invoice {
    pub fn outstanding(&self) -> f64 {
        (self.total_amount - self.amount_paid).max(0.0)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceWithLines {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub lines: Vec<DocumentLine>,
}
