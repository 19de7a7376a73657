use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Category {
    pub id: u64,
    #[schema(example = "Beverages")]
    pub name: String,
    pub description: String,
}

/// Product row with `stock_quantity` resolved either at one location or summed
/// across all of them, depending on the query that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 7,
        "sku": "BEV-COLA-500",
        "name": "Cola 500ml",
        "description": "",
        "category": "Beverages",
        "barcode": "6001234567890",
        "cost_price": 450.0,
        "selling_price": 700.0,
        "taxable": true,
        "reorder_level": 24,
        "is_active": true,
        "stock_quantity": 120,
        "updated_at": "2026-01-01T08:00:00Z"
    })
)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub barcode: Option<String>,
    pub cost_price: f64,
    pub selling_price: f64,
    pub taxable: bool,
    pub reorder_level: i64,
    pub is_active: bool,
    pub stock_quantity: i64,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LocationStockRow {
    pub location_id: u64,
    pub location_name: String,
    pub quantity: i64,
}
