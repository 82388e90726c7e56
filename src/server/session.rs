use crate::pipeline::channel::{record_queue, Receiver, Sender};
use crate::record::{Record, RecordError, MAX_FRAME_BYTES};
use crate::storage::traits::RecordStore;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("read failed: {0}")]
    Read(#[from] LinesCodecError),

    #[error("malformed record: {0}")]
    Decode(#[from] RecordError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub decoded: u64,
    pub stored: u64,
    pub failed: u64,
}

/// Handles one inbound connection.
///
/// Decoding and storing are decoupled by a bounded queue: a slow backend
/// fills the queue and then stalls the decoder, which in turn stops reading
/// from the socket. Any read or decode error ends the session; records that
/// were already queued are still stored before the worker stops.
pub struct IngestionSession {
    id: Uuid,
    peer: String,
    store: Arc<dyn RecordStore>,
    queue_capacity: usize,
}

impl IngestionSession {
    pub fn new(peer: impl Into<String>, store: Arc<dyn RecordStore>, queue_capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            store,
            queue_capacity,
        }
    }

    pub async fn run<S>(self, stream: S) -> SessionSummary
    where
        S: AsyncRead + Unpin,
    {
        let (tx, rx) = record_queue(self.queue_capacity);
        let worker = tokio::spawn(run_store_worker(self.id, rx, Arc::clone(&self.store)));

        info!(session = %self.id, peer = %self.peer, "Container connected");

        let mut decoded = 0u64;
        // Consumes the stream, so the connection is closed before we wait on the worker
        let outcome = decode_records(stream, &tx, &mut decoded).await;
        drop(tx);

        match outcome {
            Ok(()) => info!(session = %self.id, peer = %self.peer, decoded, "Container disconnected"),
            Err(e) => warn!(
                session = %self.id,
                peer = %self.peer,
                decoded,
                error = %e,
                "Container disconnected on error"
            ),
        }

        let (stored, failed) = match worker.await {
            Ok(counts) => counts,
            Err(e) => {
                error!(session = %self.id, error = %e, "Store worker panicked");
                (0, 0)
            }
        };

        SessionSummary {
            decoded,
            stored,
            failed,
        }
    }
}

async fn decode_records<S>(stream: S, tx: &Sender<Record>, decoded: &mut u64) -> Result<(), SessionError>
where
    S: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));

    while let Some(line) = lines.next().await {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = Record::from_json(line)?;
        *decoded += 1;

        if tx.send(record).await.is_err() {
            // Worker is gone; nothing left to hand records to
            break;
        }
    }

    Ok(())
}

/// Drain the session queue into the store, sequentially, until it closes.
async fn run_store_worker(
    session: Uuid,
    mut rx: Receiver<Record>,
    store: Arc<dyn RecordStore>,
) -> (u64, u64) {
    let mut stored = 0;
    let mut failed = 0;

    while let Some(record) = rx.recv().await {
        match store.store(&record).await {
            Ok(()) => stored += 1,
            Err(e) => {
                failed += 1;
                error!(
                    session = %session,
                    container = %record.container_name,
                    collection = %record.collection(),
                    error = %e,
                    "Dropping record"
                );
            }
        }
    }

    debug!(session = %session, stored, failed, "Store worker finished");
    (stored, failed)
}
