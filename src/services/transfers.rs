use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::client::{extract_collection, ApiClient};
use crate::errors::ServiceError;
use crate::models::transfer::{RemoteTransfer, TransferRequest};

/// In-memory view of the backend transfer list.
///
/// `refresh` replaces the list wholesale; there is no incremental merge, so
/// any open detail view re-fetches after a mutating action. A failed load
/// leaves the previous list untouched and records the error, letting
/// callers distinguish "empty" from "unknown".
pub struct TransferStore {
    client: Arc<ApiClient>,
    transfers: RwLock<Vec<TransferRequest>>,
    last_error: RwLock<Option<String>>,
}

impl TransferStore {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            transfers: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
        }
    }

    /// Fetches and normalizes all transfer requests, replacing the cached
    /// list on success. Returns the number of transfers loaded.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, ServiceError> {
        match self.fetch().await {
            Ok(list) => {
                let count = list.len();
                *self.transfers.write().await = list;
                *self.last_error.write().await = None;
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "Failed to load transfer requests");
                *self.last_error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<TransferRequest>, ServiceError> {
        let body = self.client.get_raw("inventory-transfers").await?;
        let records = extract_collection(&body, "transfers").ok_or_else(|| {
            ServiceError::ExternalApiError(
                "Transfer list response did not match any accepted shape".to_string(),
            )
        })?;

        let mut transfers = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<RemoteTransfer>(record) {
                Ok(remote) => transfers.push(TransferRequest::from(remote)),
                Err(e) => warn!(error = %e, "Skipping malformed transfer record"),
            }
        }
        Ok(transfers)
    }

    /// Cloned snapshot of the cached list.
    pub async fn transfers(&self) -> Vec<TransferRequest> {
        self.transfers.read().await.clone()
    }

    pub async fn find(&self, id: Uuid) -> Option<TransferRequest> {
        self.transfers
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// The error recorded by the most recent failed refresh, cleared by the
    /// next successful one. An empty list with this set means "unknown",
    /// not "zero transfers".
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }
}
