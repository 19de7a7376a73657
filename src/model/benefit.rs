use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BenefitType {
    Health,
    Retirement,
    Insurance,
    Allowance,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Benefit {
    pub id: u64,
    pub name: String,
    pub benefit_type: String,
    pub provider: String,
    /// Percent of premium paid by the employer
    pub employer_contribution: f64,
    pub employee_contribution: f64,
    pub enrolled: i32,
    #[schema(example = "active")]
    pub status: String,
}
