use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use erp::config::AgentConfig;
use erp::model::sync::SyncKind;
use erp::offline::client::HttpTransport;
use erp::offline::store::{LocalStatus, LocalStore};
use erp::offline::sync::SyncWorker;
use erp::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;

    let _guard = telemetry::init("pos-agent.log", &config.log_level);
    info!(device = %config.device_name, location_id = config.location_id, "POS agent starting...");

    let store = LocalStore::open(&config.cache_url, config.location_id)
        .await
        .with_context(|| format!("Failed to open local cache {}", config.cache_url))?;

    for kind in SyncKind::ALL {
        let pending = store.count_by_status(kind, LocalStatus::Pending).await?;
        let failed = store.count_by_status(kind, LocalStatus::Failed).await?;
        info!(%kind, pending, failed, "Local records awaiting sync");
    }

    let transport = HttpTransport::new(&config.api_url, &config.api_token, Duration::from_secs(30))
        .context("Failed to build HTTP client")?;

    let worker = SyncWorker::new(
        store,
        transport,
        Duration::from_secs(config.sync_interval_secs),
    );
    let handle = worker.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down, finishing current sync pass");
    handle.stop().await;

    Ok(())
}
