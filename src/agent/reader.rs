use crate::agent::runtime::Workload;
use crate::pipeline::channel::Sender;
use crate::record::{Record, MAX_LINE_BYTES};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;
use tracing::{error, info, trace};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("read failed: {0}")]
    Read(#[from] AnyDelimiterCodecError),
}

/// Lifecycle of one workload's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Attaching,
    Streaming,
    Closed,
}

/// Split a chunked byte stream into lines.
///
/// Chunk boundaries do not need to line up with newlines. A trailing `\r`
/// is stripped, invalid UTF-8 is replaced, and a final unterminated line is
/// still emitted. A line longer than [`MAX_LINE_BYTES`] ends the stream with
/// an error.
pub fn split_lines<S>(chunks: S) -> impl Stream<Item = Result<String, ReaderError>> + Unpin
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_BYTES);

    FramedRead::new(StreamReader::new(chunks), codec).map(|frame| {
        let frame = frame?;
        let line = String::from_utf8_lossy(&frame);
        Ok(line.strip_suffix('\r').unwrap_or(&*line).to_string())
    })
}

/// Turns one workload's output lines into records.
pub struct WorkloadReader {
    container_id: String,
    container_name: String,
    hostname: String,
    state: watch::Sender<StreamState>,
}

impl WorkloadReader {
    pub fn new(workload: &Workload, hostname: impl Into<String>) -> Self {
        let (state, _) = watch::channel(StreamState::Attaching);
        Self {
            container_id: workload.id.clone(),
            container_name: workload.display_name().to_string(),
            hostname: hostname.into(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Build a record stamped with the current wall clock.
    pub fn to_record(&self, message: String) -> Record {
        Record {
            message,
            container_name: self.container_name.clone(),
            container_id: self.container_id.clone(),
            timestamp: Utc::now().timestamp(),
            hostname: self.hostname.clone(),
        }
    }

    /// Forward every line into `tx` until the output ends.
    ///
    /// Dropping `tx` on return closes the queue, which lets the sender
    /// finish once it has drained. Read errors are not retried.
    pub async fn run<L>(self, mut lines: L, tx: Sender<Record>) -> Result<u64, ReaderError>
    where
        L: Stream<Item = Result<String, ReaderError>> + Unpin,
    {
        self.state.send_replace(StreamState::Streaming);
        let mut forwarded = 0u64;

        let result = loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    trace!(container = %self.container_name, "Read line");
                    if tx.send(self.to_record(line)).await.is_err() {
                        // Sender went away (agent shutting down)
                        break Ok(forwarded);
                    }
                    forwarded += 1;
                }
                Some(Err(e)) => {
                    error!(container = %self.container_name, error = %e, "Error reading attached container");
                    break Err(e);
                }
                None => {
                    info!(container = %self.container_name, lines = forwarded, "Container closed the log pipe");
                    break Ok(forwarded);
                }
            }
        };

        self.state.send_replace(StreamState::Closed);
        result
    }
}
