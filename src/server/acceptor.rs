use crate::server::session::IngestionSession;
use crate::storage::traits::RecordStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepts connections forever, one ingestion session per connection.
pub struct Acceptor {
    listener: TcpListener,
    store: Arc<dyn RecordStore>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl Acceptor {
    pub async fn bind(
        addr: &str,
        store: Arc<dyn RecordStore>,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, store, queue_capacity, shutdown))
    }

    pub fn from_listener(
        listener: TcpListener,
        store: Arc<dyn RecordStore>,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            store,
            queue_capacity,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let session = IngestionSession::new(
                            peer.to_string(),
                            Arc::clone(&self.store),
                            self.queue_capacity,
                        );
                        tokio::spawn(session.run(stream));
                    }
                    // A single failed accept never stops the listener
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Stopped accepting connections");
    }
}
