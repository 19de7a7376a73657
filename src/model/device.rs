use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PosDevice {
    pub id: u64,
    #[schema(example = "till-1")]
    pub device_id: String,
    pub name: String,
    pub location_id: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_sync_at: Option<NaiveDateTime>,
    pub is_active: bool,
}
