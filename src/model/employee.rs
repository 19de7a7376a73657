use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Probation,
    Suspended,
    Terminated,
    Resigned,
    OnLeave,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Intern,
}

/// How `salary` is quoted: per month, per hour worked, or per day worked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SalaryType {
    Monthly,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+265991234567",
        "department_id": 10,
        "position_id": 3,
        "location_id": 1,
        "hire_date": "2024-01-01",
        "probation_end_date": "2024-04-01",
        "salary": 450000.0,
        "salary_type": "monthly",
        "employment_type": "full_time",
        "status": "active",
        "annual_leave_balance": 21,
        "sick_leave_balance": 10
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "+265991234567", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = 10, nullable = true)]
    pub department_id: Option<u64>,

    #[schema(example = 3, nullable = true)]
    pub position_id: Option<u64>,

    #[schema(example = 1, nullable = true)]
    pub location_id: Option<u64>,

    #[schema(example = "2024-01-01", value_type = String, format = "date")]
    pub hire_date: NaiveDate,

    #[schema(example = "2024-04-01", value_type = Option<String>, format = "date")]
    pub probation_end_date: Option<NaiveDate>,

    #[schema(example = 450000.0)]
    pub salary: f64,

    #[schema(example = "monthly")]
    pub salary_type: String,

    #[schema(example = "full_time")]
    pub employment_type: String,

    #[schema(example = "active")]
    pub status: String,

    #[schema(example = 21)]
    pub annual_leave_balance: i32,

    #[schema(example = 10)]
    pub sick_leave_balance: i32,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
