use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayrollStatus {
    Draft,
    Processed,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollSlip {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,

    pub basic_salary: f64,
    pub overtime_pay: f64,
    pub bonuses: f64,
    pub allowances: f64,

    pub tax: f64,
    pub insurance: f64,
    pub other_deductions: f64,

    pub gross_salary: f64,
    pub net_salary: f64,

    pub days_worked: i32,
    pub hours_worked: f64,
    pub overtime_hours: f64,

    #[schema(example = "processed")]
    pub status: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl PayrollSlip {
    pub fn total_deductions(&self) -> f64 {
        self.tax + self.insurance + self.other_deductions
    }
}
