//! REST side of till sync.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::model::sync::{
    CatalogResponse, PushResult, SyncMovement, SyncSale, SyncStockTake, SyncTransfer,
};
use crate::offline::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The server could not be reached; nothing was settled.
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({0}): {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the sync worker needs from the server.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn ping(&self) -> Result<(), SyncError>;
    async fn push_sales(&self, sales: &[SyncSale]) -> Result<PushResult, SyncError>;
    async fn push_movements(&self, movements: &[SyncMovement]) -> Result<PushResult, SyncError>;
    async fn push_transfers(&self, transfers: &[SyncTransfer]) -> Result<PushResult, SyncError>;
    async fn push_stock_takes(&self, takes: &[SyncStockTake]) -> Result<PushResult, SyncError>;
    async fn pull_catalog(
        &self,
        location_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<CatalogResponse, SyncError>;
}

/// `reqwest` client speaking to `/api/pos/sync` with the device token.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))
    }

    async fn push<B: Serialize + Sync>(&self, path: &str, records: &[B]) -> Result<PushResult, SyncError> {
        debug!(path, count = records.len(), "Pushing records");
        self.send(self.client.post(self.url(path)).json(records)).await
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn ping(&self) -> Result<(), SyncError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Api(response.status().as_u16(), "ping failed".into()))
        }
    }

    async fn push_sales(&self, sales: &[SyncSale]) -> Result<PushResult, SyncError> {
        self.push("/api/pos/sync/sales", sales).await
    }

    async fn push_movements(&self, movements: &[SyncMovement]) -> Result<PushResult, SyncError> {
        self.push("/api/pos/sync/movements", movements).await
    }

    async fn push_transfers(&self, transfers: &[SyncTransfer]) -> Result<PushResult, SyncError> {
        self.push("/api/pos/sync/transfers", transfers).await
    }

    async fn push_stock_takes(&self, takes: &[SyncStockTake]) -> Result<PushResult, SyncError> {
        self.push("/api/pos/sync/stock-takes", takes).await
    }

    async fn pull_catalog(
        &self,
        location_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<CatalogResponse, SyncError> {
        let mut query = vec![("location_id", location_id.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Micros, true)));
        }
        self.send(self.client.get(self.url("/api/pos/sync/catalog")).query(&query))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let transport =
            HttpTransport::new("http://erp.local:8080/", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.url("/api/pos/sync/sales"), "http://erp.local:8080/api/pos/sync/sales");
    }

    #[test]
    fn api_errors_keep_status_and_body() {
        let err = SyncError::Api(403, "Devices may only write to their own location".into());
        assert_eq!(
            err.to_string(),
            "API error (403): Devices may only write to their own location"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        // Port 9 (discard) on localhost is closed on test machines
        let transport =
            HttpTransport::new("http://127.0.0.1:9", "token", Duration::from_secs(2)).unwrap();
        let err = transport.ping().await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
