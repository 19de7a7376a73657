use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    pub id: u64,
    #[schema(example = "Finance")]
    pub name: String,
    #[schema(example = "FIN")]
    pub code: String,
    pub description: String,
}

/// Job position within a department. `level` runs 1 (entry) to 5 (executive).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Position {
    pub id: u64,
    #[schema(example = "Accountant")]
    pub title: String,
    pub department_id: u64,
    #[schema(example = 2)]
    pub level: i32,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
}
