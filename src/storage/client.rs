use crate::config::types::StorageConfig;
use crate::record::Record;
use crate::storage::backend::BackendClient;
use crate::storage::registry::CollectionRegistry;
use crate::storage::traits::{RecordStore, StorageError};
use crate::supervisor::state::BackendStatus;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Stores records in the collection named after their hostname.
///
/// Unknown collections are created first (any non-201 answer is logged and
/// the insert goes ahead regardless). Inserts are retried a fixed number of
/// times with a fixed delay, after which the record is dropped.
pub struct StorageClient {
    backend: BackendClient,
    registry: Arc<CollectionRegistry>,
    max_attempts: u32,
    retry_delay: Duration,
    readiness: Option<watch::Receiver<BackendStatus>>,
}

impl StorageClient {
    pub fn new(
        backend: BackendClient,
        registry: Arc<CollectionRegistry>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            readiness: None,
        }
    }

    /// Hold every request until the supervised backend reports itself running.
    pub fn with_readiness(mut self, readiness: watch::Receiver<BackendStatus>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    async fn wait_until_ready(&self) {
        let Some(readiness) = &self.readiness else {
            return;
        };

        let mut readiness = readiness.clone();
        let result = readiness
            .wait_for(|status| status.state.accepts_requests() || status.state.is_terminal())
            .await
            .map(|status| status.state);

        match result {
            Ok(state) if state.is_terminal() => {
                debug!(state = %state, "Backend is not running, issuing request anyway")
            }
            Ok(_) => {}
            Err(_) => debug!("Backend supervisor is gone, issuing request anyway"),
        }
    }

    async fn ensure_collection(&self, collection: &str) {
        if self.registry.exists(collection).await {
            return;
        }

        match self.backend.create_collection(collection).await {
            Ok(StatusCode::CREATED) => {
                info!(collection = %collection, "Created new collection");
                self.registry.mark_existing(collection).await;
            }
            Ok(status) => {
                debug!(
                    collection = %collection,
                    status = status.as_u16(),
                    "Collection not created, inserting anyway"
                );
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Create collection failed, inserting anyway");
            }
        }
    }

    async fn insert_with_retry(&self, collection: &str, document: &str) -> Result<u32, StorageError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.backend.insert(collection, document).await {
                Ok(StatusCode::CREATED) => return Ok(attempt),
                Ok(status) => StorageError::UnexpectedStatus {
                    operation: "insert",
                    status: status.as_u16(),
                },
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                error!(
                    collection = %collection,
                    attempts = attempt,
                    error = %failure,
                    "Failed to store record, dropping it"
                );
                return Err(StorageError::RetriesExhausted { attempts: attempt });
            }

            warn!(
                collection = %collection,
                attempt = attempt,
                retry_in_ms = self.retry_delay.as_millis() as u64,
                error = %failure,
                "Failed to store record, retrying"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[async_trait]
impl RecordStore for StorageClient {
    async fn store(&self, record: &Record) -> Result<(), StorageError> {
        let collection = record.collection();
        let document = record.to_document()?;

        self.wait_until_ready().await;
        self.ensure_collection(collection).await;

        let attempts = self.insert_with_retry(collection, &document).await?;
        debug!(
            collection = %collection,
            attempts = attempts,
            document = %document,
            "Stored record"
        );
        Ok(())
    }
}
