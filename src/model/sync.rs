//! Wire types shared by the `/pos/sync` endpoints and the offline agent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::location::Location;
use crate::model::product::Product;
use crate::model::sale::PaymentMethod;
use crate::model::stock::MovementType;

/// The kinds of record a till creates offline and pushes upstream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncKind {
    Sale,
    Movement,
    Transfer,
    StockTake,
}

impl SyncKind {
    pub const ALL: [SyncKind; 4] = [
        SyncKind::Sale,
        SyncKind::Movement,
        SyncKind::Transfer,
        SyncKind::StockTake,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncSaleItem {
    pub product_id: u64,
    pub sku: String,
    pub product_name: String,
    #[serde(default)]
    pub category: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub cost_price: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncSale {
    /// Client generated, unique per till sale.
    pub pos_transaction_id: String,
    pub receipt_number: String,
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
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub items: Vec<SyncSaleItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncMovement {
    pub uuid: String,
    pub product_id: u64,
    pub movement_type: MovementType,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    pub quantity: i64,
    pub unit_cost: f64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub reason: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncTransferItem {
    pub product_id: u64,
    pub quantity: i64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncTransfer {
    pub uuid: String,
    pub from_location_id: u64,
    pub to_location_id: u64,
    #[serde(default)]
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub items: Vec<SyncTransferItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncStockTakeItem {
    pub product_id: u64,
    pub system_quantity: i64,
    pub physical_quantity: i64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncStockTake {
    pub uuid: String,
    pub location_id: u64,
    #[serde(default)]
    pub notes: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub items: Vec<SyncStockTakeItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectedRecord {
    /// `pos_transaction_id` for sales, `uuid` for everything else.
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PushResult {
    pub accepted: Vec<String>,
    pub duplicates: Vec<String>,
    pub rejected: Vec<RejectedRecord>,
}

impl PushResult {
    /// Ids the client can stop resending.
    pub fn settled(&self) -> impl Iterator<Item = &String> {
        self.accepted.iter().chain(self.duplicates.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogResponse {
    pub products: Vec<Product>,
    pub locations: Vec<Location>,
    #[schema(value_type = String, format = "date-time")]
    pub server_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_kind_renders_snake_case() {
        assert_eq!(SyncKind::StockTake.to_string(), "stock_take");
        assert_eq!("movement".parse::<SyncKind>().unwrap(), SyncKind::Movement);
    }

    #[test]
    fn settled_covers_accepted_and_duplicates() {
        let result = PushResult {
            accepted: vec!["a".into()],
            duplicates: vec!["b".into()],
            rejected: vec![RejectedRecord { id: "c".into(), error: "bad".into() }],
        };
        let ids: Vec<&String> = result.settled().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
