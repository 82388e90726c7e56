use crate::agent::reader::{split_lines, ReaderError, StreamState, WorkloadReader};
use crate::agent::runtime::{RuntimeError, Workload, WorkloadRuntime};
use crate::agent::sender::{RecordSender, SenderError, SenderStats, TcpConnector};
use crate::pipeline::channel::record_queue;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-stream settings shared by every workload the agent attaches to.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub hostname: String,
    pub server_addr: String,
    pub queue_capacity: usize,
    pub reconnect_delay: Duration,
}

/// A running reader/sender pair for one workload.
pub struct WorkloadStream {
    workload: Workload,
    state: watch::Receiver<StreamState>,
    reader: JoinHandle<Result<u64, ReaderError>>,
    sender: JoinHandle<Result<SenderStats, SenderError>>,
}

#[derive(Debug)]
pub struct StreamSummary {
    pub read: Result<u64, ReaderError>,
    pub sent: Result<SenderStats, SenderError>,
}

impl WorkloadStream {
    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished() && self.sender.is_finished()
    }

    /// Wait for both halves. The sender finishes once the reader has closed
    /// the queue and everything queued has been delivered.
    pub async fn join(self) -> Result<StreamSummary, JoinError> {
        let read = self.reader.await?;
        let sent = self.sender.await?;
        Ok(StreamSummary { read, sent })
    }
}

/// Attach to `workload`'s output from now on and ship it to the server.
///
/// `stop_reading` ends the output stream, after which the sender drains what
/// is queued. `stop_sending` abandons delivery, including any dial in
/// progress.
pub fn spawn_workload_stream(
    runtime: &dyn WorkloadRuntime,
    workload: Workload,
    settings: &StreamSettings,
    stop_reading: &CancellationToken,
    stop_sending: &CancellationToken,
) -> WorkloadStream {
    let (tx, rx) = record_queue(settings.queue_capacity);

    let reader = WorkloadReader::new(&workload, settings.hostname.clone());
    let state = reader.subscribe();

    let chunks = runtime
        .output(&workload.id, Utc::now().timestamp())
        .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
    let lines = Box::pin(split_lines(chunks).take_until(stop_reading.clone().cancelled_owned()));

    let sender = RecordSender::new(
        workload.display_name(),
        TcpConnector::new(settings.server_addr.clone()),
        settings.reconnect_delay,
        stop_sending.clone(),
    );

    WorkloadStream {
        state,
        reader: tokio::spawn(reader.run(lines, tx)),
        sender: tokio::spawn(sender.run(rx)),
        workload,
    }
}

/// What is left when the monitor stops. Streams are returned on every exit
/// path so the caller can flush them, including after a runtime failure.
pub struct MonitorExit {
    pub streams: Vec<WorkloadStream>,
    pub result: Result<(), RuntimeError>,
}

/// Discovers workloads and keeps one [`WorkloadStream`] per started workload.
///
/// The event subscription is opened before the initial listing so no start
/// is missed. A workload that starts in between may get two streams; both
/// are kept.
pub struct WorkloadMonitor {
    runtime: Arc<dyn WorkloadRuntime>,
    settings: StreamSettings,
    shutdown: CancellationToken,
    stop_sending: CancellationToken,
    streams: Vec<WorkloadStream>,
}

impl WorkloadMonitor {
    pub fn new(
        runtime: Arc<dyn WorkloadRuntime>,
        settings: StreamSettings,
        shutdown: CancellationToken,
        stop_sending: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            settings,
            shutdown,
            stop_sending,
            streams: Vec::new(),
        }
    }

    /// Run until the token is cancelled or the runtime closes the event
    /// stream, or the stream fails.
    pub async fn run(mut self) -> MonitorExit {
        let mut events = self.runtime.events();

        let listed = match self.runtime.list_workloads().await {
            Ok(listed) => listed,
            Err(e) => {
                error!(error = %e, "Could not list containers");
                return MonitorExit {
                    streams: self.streams,
                    result: Err(e),
                };
            }
        };

        for id in listed {
            match self.runtime.inspect(&id).await {
                Ok(workload) if workload.running => {
                    info!(container = %workload.display_name(), "Container existed on start");
                    self.spawn(workload);
                }
                Ok(workload) => {
                    debug!(container = %workload.display_name(), "Skipping stopped container");
                }
                Err(e) => warn!(id = %id, error = %e, "Could not inspect container"),
            }
        }

        let result = loop {
            let event = tokio::select! {
                event = events.next() => event,
                _ = self.shutdown.cancelled() => break Ok(()),
            };

            match event {
                Some(Ok(event)) if event.is_start() => match self.runtime.inspect(&event.id).await {
                    Ok(workload) if workload.running => {
                        info!(container = %workload.display_name(), "Container started");
                        self.spawn(workload);
                    }
                    Ok(_) => debug!(id = %event.id, "Container no longer running"),
                    Err(e) => warn!(id = %event.id, error = %e, "Could not inspect container"),
                },
                Some(Ok(event)) => debug!(id = %event.id, status = %event.status, "Ignoring event"),
                Some(Err(e)) => {
                    error!(error = %e, "Lifecycle event stream failed");
                    break Err(e);
                }
                None => {
                    warn!("Runtime closed the lifecycle event stream");
                    break Ok(());
                }
            }
        };

        drop(events);
        info!("Unsubscribed from container events");

        MonitorExit {
            streams: self.streams,
            result,
        }
    }

    fn spawn(&mut self, workload: Workload) {
        self.streams.retain(|stream| !stream.is_finished());
        let stream = spawn_workload_stream(
            self.runtime.as_ref(),
            workload,
            &self.settings,
            &self.shutdown,
            &self.stop_sending,
        );
        self.streams.push(stream);
    }
}
