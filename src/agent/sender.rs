use crate::pipeline::channel::Receiver;
use crate::record::Record;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("sender cancelled with {pending} record(s) undelivered")]
    Cancelled { pending: usize },
}

/// Opens the outbound link to the server.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: AsyncWrite + Unpin + Send;

    async fn connect(&self) -> std::io::Result<Self::Conn>;

    fn target(&self) -> &str;
}

/// Plain TCP to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpStream;

    async fn connect(&self) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn target(&self) -> &str {
        &self.addr
    }
}

enum Link<W> {
    Disconnected,
    Connected(W),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub delivered: u64,
    pub reconnects: u64,
}

/// Delivers one workload's records over a single logical stream, one JSON
/// object per line.
///
/// A failed write drops the link and the same record is sent again on the
/// next connection, so delivery is at-least-once. Dialing is retried with a
/// fixed delay until it succeeds or the token is cancelled.
pub struct RecordSender<C: Connector> {
    name: String,
    connector: C,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
    link: Link<C::Conn>,
    stats: SenderStats,
}

impl<C: Connector> RecordSender<C> {
    pub fn new(
        name: impl Into<String>,
        connector: C,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            reconnect_delay,
            shutdown,
            link: Link::Disconnected,
            stats: SenderStats::default(),
        }
    }

    /// Drain `rx` until it is closed, then close the link.
    pub async fn run(mut self, mut rx: Receiver<Record>) -> Result<SenderStats, SenderError> {
        while let Some(record) = rx.recv().await {
            let line = match record.to_line() {
                Ok(line) => line,
                Err(e) => {
                    error!(container = %self.name, error = %e, "Could not encode record, skipping");
                    continue;
                }
            };

            if !self.deliver(&line).await {
                // Count the in-hand record plus whatever is still queued
                let pending = 1 + rx.len();
                self.close().await;
                return Err(SenderError::Cancelled { pending });
            }
        }

        self.close().await;
        Ok(self.stats)
    }

    /// Returns false only when cancelled before the line was fully written.
    async fn deliver(&mut self, line: &[u8]) -> bool {
        loop {
            if let Link::Disconnected = self.link {
                match self.dial().await {
                    Some(conn) => self.link = Link::Connected(conn),
                    None => return false,
                }
            }

            let Link::Connected(conn) = &mut self.link else {
                continue;
            };

            let written = tokio::select! {
                result = write_line(conn, line) => result,
                _ = self.shutdown.cancelled() => return false,
            };

            match written {
                Ok(()) => {
                    self.stats.delivered += 1;
                    return true;
                }
                Err(e) => {
                    warn!(container = %self.name, error = %e, "Write to server failed, reconnecting");
                    self.close().await;
                    self.stats.reconnects += 1;
                }
            }
        }
    }

    async fn dial(&self) -> Option<C::Conn> {
        info!(container = %self.name, server = %self.connector.target(), "Connecting to server");

        loop {
            let attempt = tokio::select! {
                result = self.connector.connect() => result,
                _ = self.shutdown.cancelled() => return None,
            };

            match attempt {
                Ok(conn) => {
                    info!(container = %self.name, "Connected");
                    return Some(conn);
                }
                Err(e) => {
                    warn!(
                        container = %self.name,
                        error = %e,
                        retry_in_secs = self.reconnect_delay.as_secs_f64(),
                        "Error connecting to server"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Link::Connected(mut conn) = std::mem::replace(&mut self.link, Link::Disconnected) {
            if let Err(e) = conn.shutdown().await {
                debug!(container = %self.name, error = %e, "Error closing connection");
            }
            info!(container = %self.name, "Disconnected from server");
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(conn: &mut W, line: &[u8]) -> std::io::Result<()> {
    conn.write_all(line).await?;
    conn.flush().await
}
