use crate::record::Record;
use async_trait::async_trait;

/// Destination for decoded records on the server side.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn store(&self, record: &Record) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] crate::record::RecordError),

    #[error("backend returned status {status} for {operation}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
