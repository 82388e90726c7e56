use crate::config::types::BackendConfig;
use crate::storage::backend::BackendClient;
use crate::storage::registry::CollectionRegistry;
use crate::supervisor::process::BackendProcess;
use crate::supervisor::state::{BackendState, BackendStatus, SupervisorEvent};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn backend '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend stopped before becoming ready")]
    StoppedBeforeReady,

    #[error("supervisor task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Owns the backend process: starts it, restarts it when it dies, and
/// drains it when shutdown is requested through the cancellation token.
pub struct BackendSupervisor {
    config: BackendConfig,
    backend: BackendClient,
    registry: Arc<CollectionRegistry>,
    shutdown: CancellationToken,
    status_tx: watch::Sender<BackendStatus>,
    restarts: u64,
}

/// Returned by [`BackendSupervisor::start`].
pub struct SupervisorHandle {
    status: watch::Receiver<BackendStatus>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn status(&self) -> watch::Receiver<BackendStatus> {
        self.status.clone()
    }

    /// Wait for the first successful readiness probe.
    pub async fn wait_until_running(&mut self) -> Result<BackendStatus, SupervisorError> {
        let status = self
            .status
            .wait_for(|s| s.state.accepts_requests() || s.state.is_terminal())
            .await
            .map(|s| *s)
            .map_err(|_| SupervisorError::StoppedBeforeReady)?;

        if status.state.is_terminal() {
            return Err(SupervisorError::StoppedBeforeReady);
        }
        Ok(status)
    }

    /// Resolves once the backend reached `stopped`.
    pub async fn join(self) -> Result<(), SupervisorError> {
        self.task.await?;
        Ok(())
    }
}

impl BackendSupervisor {
    pub fn new(
        config: BackendConfig,
        backend: BackendClient,
        registry: Arc<CollectionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(BackendStatus::starting());
        Self {
            config,
            backend,
            registry,
            shutdown,
            status_tx,
            restarts: 0,
        }
    }

    /// Spawn the backend and hand the rest of its lifecycle to a task.
    ///
    /// Failing to spawn the very first instance is fatal; later respawn
    /// failures are retried after the restart delay.
    pub fn start(self) -> Result<SupervisorHandle, SupervisorError> {
        let process = self.spawn_process()?;
        let status = self.status_tx.subscribe();
        let task = tokio::spawn(self.supervise(process));

        Ok(SupervisorHandle { status, task })
    }

    fn spawn_process(&self) -> Result<BackendProcess, SupervisorError> {
        let process = BackendProcess::spawn(&self.config).map_err(|source| SupervisorError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        info!(
            command = %self.config.command,
            pid = ?process.pid(),
            "Started backend process"
        );
        Ok(process)
    }

    fn publish(&self, state: BackendState, pid: Option<u32>) {
        self.status_tx.send_replace(BackendStatus {
            state,
            pid,
            restarts: self.restarts,
        });
    }

    async fn supervise(mut self, process: BackendProcess) {
        let mut process = Some(process);
        let mut state = BackendState::Starting;
        self.publish(state, process.as_ref().and_then(|p| p.pid()));

        while state != BackendState::Stopped {
            let event = match state {
                BackendState::Starting => tokio::select! {
                    _ = poll_until_ready(&self.backend, self.config.readiness_interval) => SupervisorEvent::Ready,
                    exit = wait_exit(&mut process) => {
                        warn!(status = %describe_exit(&exit), "Backend exited before becoming ready");
                        SupervisorEvent::ChildExited
                    }
                    _ = self.shutdown.cancelled() => SupervisorEvent::ShutdownRequested,
                },
                BackendState::Running => tokio::select! {
                    exit = wait_exit(&mut process) => {
                        warn!(status = %describe_exit(&exit), "Backend exited unexpectedly");
                        SupervisorEvent::ChildExited
                    }
                    _ = self.shutdown.cancelled() => SupervisorEvent::ShutdownRequested,
                },
                BackendState::ExitedUnexpectedly => tokio::select! {
                    _ = tokio::time::sleep(self.config.restart_delay) => SupervisorEvent::Restart,
                    _ = self.shutdown.cancelled() => SupervisorEvent::ShutdownRequested,
                },
                BackendState::Stopping => {
                    self.drain(&mut process).await;
                    SupervisorEvent::ChildExited
                }
                BackendState::Stopped => break,
            };

            let Some(next) = state.on(event) else {
                debug!(state = %state, event = ?event, "Ignoring supervisor event");
                continue;
            };

            match next {
                BackendState::Running => {
                    seed_registry(&self.backend, &self.registry).await;
                }
                BackendState::ExitedUnexpectedly => {
                    process = None;
                }
                BackendState::Starting => {
                    self.restarts += 1;
                    info!(restarts = self.restarts, "Restarting backend");
                    match self.spawn_process() {
                        Ok(p) => process = Some(p),
                        Err(e) => {
                            error!(error = %e, "Backend respawn failed");
                            // Treated as an immediate exit so the restart delay applies
                            state = BackendState::ExitedUnexpectedly;
                            self.publish(state, None);
                            continue;
                        }
                    }
                }
                BackendState::Stopping => info!("Closing backend"),
                BackendState::Stopped => info!("Backend stopped"),
            }

            state = next;
            self.publish(state, process.as_ref().and_then(|p| p.pid()));
        }
    }

    /// Ask the backend to shut down and wait for the process to go away,
    /// killing it after the grace period.
    async fn drain(&self, process: &mut Option<BackendProcess>) {
        let Some(mut child) = process.take() else {
            return;
        };

        if let Err(e) = self.backend.shutdown().await {
            warn!(error = %e, "Backend shutdown request failed");
        }

        match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
            Ok(exit) => info!(status = %describe_exit(&exit), "Backend exited"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.shutdown_grace.as_millis() as u64,
                    "Backend did not exit in time, killing it"
                );
                if let Err(e) = child.kill().await {
                    error!(error = %e, "Failed to kill backend");
                }
            }
        }
    }
}

/// Poll the readiness endpoint with a fixed delay until it answers 200.
/// Never gives up on its own; callers race it against cancellation.
pub async fn poll_until_ready(backend: &BackendClient, interval: Duration) {
    loop {
        debug!(url = %backend.base_url(), "Querying collections");
        if backend.is_ready().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Add the backend's existing collections to the registry.
pub async fn seed_registry(backend: &BackendClient, registry: &CollectionRegistry) {
    match backend.list_collections().await {
        Ok(collections) => {
            registry.seed(collections).await;
            let names = registry.names().await;
            info!(collections = ?names, "Existing collections");
        }
        Err(e) => warn!(error = %e, "Could not list existing collections"),
    }
}

async fn wait_exit(process: &mut Option<BackendProcess>) -> std::io::Result<ExitStatus> {
    match process {
        Some(p) => p.wait().await,
        None => std::future::pending().await,
    }
}

fn describe_exit(exit: &std::io::Result<ExitStatus>) -> String {
    match exit {
        Ok(status) => status.to_string(),
        Err(e) => format!("wait failed: {}", e),
    }
}
