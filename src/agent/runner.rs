use crate::agent::monitor::{StreamSettings, WorkloadMonitor, WorkloadStream};
use futures::future::join_all;
use crate::agent::runtime::{DockerRuntime, RuntimeError, WorkloadRuntime};
use crate::config::types::Config;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long senders get to flush queued records after the monitor stops.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("could not determine hostname")]
    Hostname,
}

/// Composition root of the collector agent.
pub struct AgentRunner {
    config: Config,
    server_addr: String,
}

impl AgentRunner {
    pub fn new(config: Config, server_addr: impl Into<String>) -> Self {
        Self {
            config,
            server_addr: server_addr.into(),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AgentError> {
        let socket = &self.config.agent.docker_socket;
        info!(socket = %socket.display(), "Connecting to container runtime");
        let runtime = DockerRuntime::connect(socket)?;

        self.run_with_runtime(Arc::new(runtime), shutdown).await
    }

    /// Same as [`run`](Self::run) against any runtime.
    pub async fn run_with_runtime(
        self,
        runtime: Arc<dyn WorkloadRuntime>,
        shutdown: CancellationToken,
    ) -> Result<(), AgentError> {
        let hostname = resolve_hostname(self.config.agent.hostname.as_deref())?;
        info!(hostname = %hostname, server = %self.server_addr, "Starting collector agent");

        let settings = StreamSettings {
            hostname,
            server_addr: self.server_addr,
            queue_capacity: self.config.agent.queue_capacity,
            reconnect_delay: self.config.agent.reconnect_delay,
        };

        let stop_sending = CancellationToken::new();
        let exit = WorkloadMonitor::new(runtime, settings, shutdown.clone(), stop_sending.clone())
            .run()
            .await;

        // Stop reading on every exit path, then let senders flush
        shutdown.cancel();
        drain_streams(exit.streams, &stop_sending).await;
        exit.result?;

        info!("Bye");
        Ok(())
    }
}

/// Configured override first, then the OS hostname.
pub fn resolve_hostname(configured: Option<&str>) -> Result<String, AgentError> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }

    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .ok_or(AgentError::Hostname)
}

/// Waits for every stream to finish. Senders still busy after
/// [`STREAM_DRAIN_TIMEOUT`] are cancelled and report what they dropped.
async fn drain_streams(streams: Vec<WorkloadStream>, stop_sending: &CancellationToken) {
    let joins = streams.into_iter().map(|stream| async move {
        let name = stream.workload().display_name().to_string();
        (name, stream.join().await)
    });
    let mut joins = Box::pin(join_all(joins));

    let finished = match tokio::time::timeout(STREAM_DRAIN_TIMEOUT, &mut joins).await {
        Ok(finished) => finished,
        Err(_) => {
            warn!(timeout_secs = STREAM_DRAIN_TIMEOUT.as_secs(), "Streams did not flush in time, cancelling");
            stop_sending.cancel();
            joins.await
        }
    };

    for (name, joined) in finished {
        match joined {
            Ok(summary) => {
                if let Err(e) = summary.sent {
                    warn!(container = %name, error = %e, "Stream stopped with undelivered records");
                }
            }
            Err(e) => warn!(container = %name, error = %e, "Stream task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::runtime::{LifecycleEvent, Workload};
    use crate::record::Record;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::{self, BoxStream};
    use futures::StreamExt;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// One running workload that prints two lines and then stays quiet. Its
    /// event subscription fails shortly after.
    struct FailingEventsRuntime;

    #[async_trait]
    impl WorkloadRuntime for FailingEventsRuntime {
        async fn list_workloads(&self) -> Result<Vec<String>, RuntimeError> {
            Ok(vec!["web-id".to_string()])
        }

        async fn inspect(&self, id: &str) -> Result<Workload, RuntimeError> {
            Ok(Workload {
                id: id.to_string(),
                name: "/web".to_string(),
                running: true,
            })
        }

        fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, RuntimeError>> {
            stream::once(async {
                // Long enough for the output to be read first
                tokio::time::sleep(Duration::from_millis(200)).await;
                Err(RuntimeError::InvalidSocket("event stream dropped".to_string()))
            })
            .boxed()
        }

        fn output(&self, _id: &str, _since: i64) -> BoxStream<'static, Result<Bytes, RuntimeError>> {
            stream::iter(vec![Ok(Bytes::from_static(b"one\ntwo\n"))])
                .chain(stream::pending())
                .boxed()
        }
    }

    #[test]
    fn test_configured_hostname_wins() {
        assert_eq!(resolve_hostname(Some("edge-01")).unwrap(), "edge-01");
    }

    #[test]
    fn test_os_hostname_is_not_empty() {
        let name = resolve_hostname(None).unwrap();
        assert!(!name.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_failure_still_flushes_open_streams() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(conn).lines();
            let mut messages = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                messages.push(Record::from_json(&line).unwrap().message);
            }
            messages
        });

        let mut config = Config::default();
        config.agent.hostname = Some("edge-01".to_string());
        config.agent.reconnect_delay = Duration::from_millis(20);

        let shutdown = CancellationToken::new();
        let result = AgentRunner::new(config, addr)
            .run_with_runtime(Arc::new(FailingEventsRuntime), shutdown.clone())
            .await;
        assert!(matches!(result, Err(AgentError::Runtime(_))));
        assert!(shutdown.is_cancelled());

        // The stream was closed and its sender drained before the error returned
        let messages = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("connection should be closed")
            .unwrap();
        assert_eq!(messages, vec!["one", "two"]);
    }
}
