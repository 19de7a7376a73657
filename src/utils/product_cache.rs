use moka::future::Cache;
use once_cell::sync::Lazy;
use std::time::Duration;
use tracing::warn;

use crate::model::product::Product;

/// (location_id, barcode or sku) => product with stock at that location
static PRODUCT_CACHE: Lazy<Cache<(u64, String), Product>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(50_000)
        .time_to_live(Duration::from_secs(300))
        .support_invalidation_closures()
        .build()
});

#[inline]
fn key(location_id: u64, code: &str) -> (u64, String) {
    (location_id, code.trim().to_string())
}

pub async fn get(location_id: u64, code: &str) -> Option<Product> {
    PRODUCT_CACHE.get(&key(location_id, code)).await
}

pub async fn put(location_id: u64, code: &str, product: Product) {
    PRODUCT_CACHE.insert(key(location_id, code), product).await;
}

/// Drops every cached lookup of these products, at any location.
pub fn invalidate_products(product_ids: &[u64]) {
    if product_ids.is_empty() {
        return;
    }
    let ids = product_ids.to_vec();
    if let Err(e) = PRODUCT_CACHE.invalidate_entries_if(move |_, p| ids.contains(&p.id)) {
        warn!(error = %e, "Product cache predicate rejected, clearing everything");
        PRODUCT_CACHE.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: u64) -> Product {
        Product {
            id,
            sku: format!("SKU-{id}"),
            name: "Soap".into(),
            description: String::new(),
            category: "Household".into(),
            barcode: Some(format!("600{id}")),
            cost_price: 100.0,
            selling_price: 150.0,
            taxable: true,
            reorder_level: 5,
            is_active: true,
            stock_quantity: 12,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lookups_are_scoped_by_location() {
        put(9001, " SKU-1 ", product(9_000_001)).await;
        assert!(get(9001, "SKU-1").await.is_some());
        assert!(get(9002, "SKU-1").await.is_none());
    }
}
