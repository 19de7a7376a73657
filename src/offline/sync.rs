//! Background push/pull loop for the till.
//!
//! Each pass pings the server, pushes every pending record kind in creation
//! order, settles the local rows from the per-record outcome, then pulls the
//! catalog changed since the last pull. Rows stay `pending` whenever the server
//! cannot be reached, so nothing recorded at the till is ever lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, instrument, warn};

use crate::model::sync::{PushResult, SyncKind};
use crate::offline::client::{SyncError, SyncTransport};
use crate::offline::store::LocalStore;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub pulled_products: usize,
    pub pulled_locations: usize,
}

impl SyncReport {
    fn absorb(&mut self, result: &PushResult) {
        self.accepted += result.accepted.len();
        self.duplicates += result.duplicates.len();
        self.rejected += result.rejected.len();
    }
}

/// Wait before the next attempt after `failures` consecutive failed passes.
pub fn backoff_delay(base: Duration, failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.min(16));
    base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}

pub struct SyncWorker<T> {
    store: LocalStore,
    transport: Arc<T>,
    interval: Duration,
}

impl<T: SyncTransport + 'static> SyncWorker<T> {
    pub fn new(store: LocalStore, transport: T, interval: Duration) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// One full push then pull pass.
    #[instrument(skip_all, name = "sync_pass", fields(location_id = self.store.location_id()))]
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        self.transport.ping().await?;

        let mut report = SyncReport::default();

        let sales = self.store.pending_sales().await?;
        if !sales.is_empty() {
            let result = self.transport.push_sales(&sales).await?;
            self.settle(SyncKind::Sale, &result, &mut report).await?;
        }

        let movements = self.store.pending_movements().await?;
        if !movements.is_empty() {
            let result = self.transport.push_movements(&movements).await?;
            self.settle(SyncKind::Movement, &result, &mut report).await?;
        }

        let transfers = self.store.pending_transfers().await?;
        if !transfers.is_empty() {
            let result = self.transport.push_transfers(&transfers).await?;
            self.settle(SyncKind::Transfer, &result, &mut report).await?;
        }

        let takes = self.store.pending_stock_takes().await?;
        if !takes.is_empty() {
            let result = self.transport.push_stock_takes(&takes).await?;
            self.settle(SyncKind::StockTake, &result, &mut report).await?;
        }

        let since = self.store.last_pull_at().await?;
        let catalog = self
            .transport
            .pull_catalog(self.store.location_id(), since)
            .await?;
        self.store.upsert_locations(&catalog.locations).await?;
        self.store.upsert_products(&catalog.products).await?;
        self.store.set_last_pull_at(catalog.server_time).await?;
        report.pulled_products = catalog.products.len();
        report.pulled_locations = catalog.locations.len();

        Ok(report)
    }

    async fn settle(
        &self,
        kind: SyncKind,
        result: &PushResult,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let settled: Vec<String> = result.settled().cloned().collect();
        let marked = self.store.mark_synced(kind, &settled).await?;
        debug!(%kind, marked, "Marked records synced");

        for rejected in &result.rejected {
            warn!(%kind, id = %rejected.id, error = %rejected.error, "Server rejected record");
            self.store
                .mark_failed(kind, &rejected.id, &rejected.error)
                .await?;
        }
        report.absorb(result);
        Ok(())
    }

    /// Spawn the periodic loop. Failed passes back off exponentially.
    pub fn start(self) -> SyncHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut failures: u32 = 0;

            info!(interval_secs = self.interval.as_secs(), "Sync worker started");
            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {}
                }

                match self.run_once().await {
                    Ok(report) => {
                        failures = 0;
                        info!(?report, "Sync pass complete");
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let wait = backoff_delay(self.interval, failures);
                        warn!(error = %e, failures, wait_secs = wait.as_secs(), "Sync pass failed");
                        tokio::select! {
                            _ = signal.notified() => break,
                            _ = sleep(wait) => {}
                        }
                    }
                }
            }
            info!("Sync worker stopped");
        });

        SyncHandle { shutdown, task }
    }
}

pub struct SyncHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop after the current pass finishes.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::model::location::Location;
    use crate::model::sync::{
        CatalogResponse, RejectedRecord, SyncMovement, SyncSale, SyncStockTake, SyncTransfer,
    };
    use crate::offline::store::{LocalStatus, TillLine};
    use crate::offline::store::tests::{cash_sale, product, seeded_store};

    #[derive(Clone, Copy, PartialEq)]
    enum Reply {
        Accept,
        Duplicate,
        Reject,
        Offline,
    }

    struct FakeServer {
        reply: Reply,
        catalog_stock: i64,
        server_time: DateTime<Utc>,
        seen_since: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    impl FakeServer {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                catalog_stock: 50,
                server_time: Utc::now(),
                seen_since: Mutex::new(Vec::new()),
            }
        }

        fn answer(&self, ids: Vec<String>) -> Result<PushResult, SyncError> {
            let mut result = PushResult::default();
            match self.reply {
                Reply::Accept => result.accepted = ids,
                Reply::Duplicate => result.duplicates = ids,
                Reply::Reject => {
                    result.rejected = ids
                        .into_iter()
                        .map(|id| RejectedRecord { id, error: "Unknown product".into() })
                        .collect()
                }
                Reply::Offline => return Err(SyncError::Network("connection refused".into())),
            }
            Ok(result)
        }
    }

    #[async_trait]
    impl SyncTransport for FakeServer {
        async fn ping(&self) -> Result<(), SyncError> {
            if self.reply == Reply::Offline {
                return Err(SyncError::Network("connection refused".into()));
            }
            Ok(())
        }

        async fn push_sales(&self, sales: &[SyncSale]) -> Result<PushResult, SyncError> {
            self.answer(sales.iter().map(|s| s.pos_transaction_id.clone()).collect())
        }

        async fn push_movements(&self, movements: &[SyncMovement]) -> Result<PushResult, SyncError> {
            self.answer(movements.iter().map(|m| m.uuid.clone()).collect())
        }

        async fn push_transfers(&self, transfers: &[SyncTransfer]) -> Result<PushResult, SyncError> {
            self.answer(transfers.iter().map(|t| t.uuid.clone()).collect())
        }

        async fn push_stock_takes(&self, takes: &[SyncStockTake]) -> Result<PushResult, SyncError> {
            self.answer(takes.iter().map(|t| t.uuid.clone()).collect())
        }

        async fn pull_catalog(
            &self,
            _location_id: u64,
            since: Option<DateTime<Utc>>,
        ) -> Result<CatalogResponse, SyncError> {
            self.seen_since.lock().unwrap().push(since);
            Ok(CatalogResponse {
                products: vec![product(1, "COLA", 11.0, self.catalog_stock)],
                locations: vec![Location {
                    id: 1,
                    name: "Lilongwe Main".into(),
                    code: "LLW-01".into(),
                    location_type: "store".into(),
                    address: String::new(),
                    is_active: true,
                    updated_at: Utc::now(),
                }],
                server_time: self.server_time,
            })
        }
    }

    async fn store_with_one_sale() -> LocalStore {
        let store = seeded_store().await;
        store
            .record_sale(
                cash_sale(vec![TillLine { product_id: 2, quantity: 1, discount: 0.0 }], 100.0),
                0.165,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn accepted_and_duplicate_sales_are_settled() {
        for reply in [Reply::Accept, Reply::Duplicate] {
            let store = store_with_one_sale().await;
            let worker = SyncWorker::new(store.clone(), FakeServer::new(reply), Duration::from_secs(30));

            let report = worker.run_once().await.unwrap();
            assert_eq!(report.accepted + report.duplicates, 1);
            assert!(store.pending_sales().await.unwrap().is_empty());
            assert_eq!(
                store.count_by_status(SyncKind::Sale, LocalStatus::Synced).await.unwrap(),
                1
            );
        }
    }

    #[tokio::test]
    async fn rejected_sales_are_marked_failed() {
        let store = store_with_one_sale().await;
        let worker = SyncWorker::new(store.clone(), FakeServer::new(Reply::Reject), Duration::from_secs(30));

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(
            store.count_by_status(SyncKind::Sale, LocalStatus::Failed).await.unwrap(),
            1
        );
        assert!(store.pending_sales().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_server_leaves_rows_pending() {
        let store = store_with_one_sale().await;
        let worker = SyncWorker::new(store.clone(), FakeServer::new(Reply::Offline), Duration::from_secs(30));

        let err = worker.run_once().await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(store.pending_sales().await.unwrap().len(), 1);
        assert!(store.last_pull_at().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pull_refreshes_catalog_and_advances_watermark() {
        let store = seeded_store().await;
        let server = FakeServer::new(Reply::Accept);
        let server_time = server.server_time;
        let worker = SyncWorker::new(store.clone(), server, Duration::from_secs(30));

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.pulled_products, 1);
        assert_eq!(report.pulled_locations, 1);

        let cola = store.find_product("COLA").await.unwrap().unwrap();
        assert_eq!(cola.selling_price, 11.0);
        assert_eq!(cola.stock_quantity, 50);
        assert_eq!(store.list_locations().await.unwrap().len(), 1);

        let watermark = store.last_pull_at().await.unwrap().unwrap();
        assert!((watermark - server_time).num_milliseconds().abs() < 1000);

        worker.run_once().await.unwrap();
        let seen = worker.transport.seen_since.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_none());
        assert!(seen[1].is_some());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(30);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(30));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(120));
        assert_eq!(backoff_delay(base, 4), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn handle_stops_the_loop() {
        let store = seeded_store().await;
        let worker = SyncWorker::new(store, FakeServer::new(Reply::Accept), Duration::from_secs(3600));
        let handle = worker.start();
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("worker did not stop");
    }
}
