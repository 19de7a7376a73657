use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

use crate::model::sync::SyncKind;

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 1_000_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Client ids (`pos_transaction_id` / `uuid`) already ingested from tills.
static SEEN_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
fn entry(kind: SyncKind, id: &str) -> String {
    format!("{}:{}", kind.as_ref(), id)
}

/// `false` means the id was definitely never ingested; `true` needs a
/// database lookup to confirm.
pub fn might_exist(kind: SyncKind, id: &str) -> bool {
    let filter = SEEN_FILTER.read().unwrap_or_else(|e| e.into_inner());
    filter.contains(&entry(kind, id))
}

pub fn insert(kind: SyncKind, id: &str) {
    let mut filter = SEEN_FILTER.write().unwrap_or_else(|e| e.into_inner());
    filter.add(&entry(kind, id));
}

fn insert_batch(kind: SyncKind, ids: &[String]) {
    let mut filter = SEEN_FILTER.write().unwrap_or_else(|e| e.into_inner());
    for id in ids {
        filter.add(&entry(kind, id));
    }
}

fn source_query(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Sale => {
            "SELECT pos_transaction_id FROM sales WHERE pos_transaction_id IS NOT NULL"
        }
        SyncKind::Movement => "SELECT uuid FROM stock_movements WHERE uuid IS NOT NULL",
        SyncKind::Transfer => "SELECT uuid FROM stock_transfers WHERE uuid IS NOT NULL",
        SyncKind::StockTake => "SELECT uuid FROM stock_takes WHERE uuid IS NOT NULL",
    }
}

/// Warm up the filter using streaming + batching
pub async fn warmup_txn_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    for kind in SyncKind::ALL {
        let mut stream = sqlx::query_as::<_, (String,)>(source_query(kind)).fetch(pool);

        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(row) = stream.next().await {
            let (id,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

            batch.push(id);
            total += 1;

            if batch.len() == batch_size {
                insert_batch(kind, &batch);
                batch.clear();
            }
        }

        if !batch.is_empty() {
            insert_batch(kind, &batch);
        }

        tracing::info!(kind = %kind, total, "Sync id filter warmup complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_ids_are_reported_per_kind() {
        let id = "7f1c2f0e-test-filter-sale";
        assert!(!might_exist(SyncKind::Sale, id));
        insert(SyncKind::Sale, id);
        assert!(might_exist(SyncKind::Sale, id));
        assert!(!might_exist(SyncKind::Transfer, id));
    }
}
