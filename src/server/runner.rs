use crate::config::types::Config;
use crate::server::acceptor::Acceptor;
use crate::server::maintenance::run_maintenance;
use crate::storage::backend::BackendClient;
use crate::storage::client::StorageClient;
use crate::storage::registry::CollectionRegistry;
use crate::storage::traits::StorageError;
use crate::supervisor::runner::{poll_until_ready, seed_registry};
use crate::supervisor::{BackendSupervisor, SupervisorError, SupervisorHandle};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Composition root of the ingestion server.
pub struct ServerRunner {
    config: Config,
    listen_addr: String,
}

impl ServerRunner {
    pub fn new(config: Config, listen_addr: impl Into<String>) -> Self {
        Self {
            config,
            listen_addr: listen_addr.into(),
        }
    }

    /// Run until `shutdown` is cancelled and the backend has been drained.
    ///
    /// Nothing is accepted before the backend answers its readiness probe.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!("Starting ingestion server");

        let registry = Arc::new(CollectionRegistry::new());
        let backend = BackendClient::new(&self.config.backend.url, self.config.backend.request_timeout)?;

        let supervisor = if self.config.backend.supervise {
            let mut handle = BackendSupervisor::new(
                self.config.backend.clone(),
                backend.clone(),
                Arc::clone(&registry),
                shutdown.clone(),
            )
            .start()?;

            info!(url = %backend.base_url(), "Waiting for backend to become ready");
            match handle.wait_until_running().await {
                Ok(_) => {}
                Err(SupervisorError::StoppedBeforeReady) => {
                    info!("Shutdown requested before the backend became ready");
                    handle.join().await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            Some(handle)
        } else {
            info!(url = %backend.base_url(), "Waiting for external backend to become ready");
            tokio::select! {
                _ = poll_until_ready(&backend, self.config.backend.readiness_interval) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
            seed_registry(&backend, &registry).await;
            None
        };

        let mut storage = StorageClient::new(backend, registry, &self.config.storage);
        if let Some(handle) = &supervisor {
            storage = storage.with_readiness(handle.status());
        }

        let acceptor = match Acceptor::bind(
            &self.listen_addr,
            Arc::new(storage),
            self.config.server.queue_capacity,
            shutdown.clone(),
        )
        .await
        {
            Ok(acceptor) => acceptor,
            Err(source) => {
                // Drain the backend we started before reporting the failure
                shutdown.cancel();
                stop_supervisor(supervisor).await;
                return Err(ServerError::Bind {
                    addr: self.listen_addr,
                    source,
                });
            }
        };

        info!(addr = %self.listen_addr, "Server listening");

        let maintenance = tokio::spawn(run_maintenance(
            self.config.maintenance.interval,
            shutdown.clone(),
        ));
        let acceptor_handle = tokio::spawn(acceptor.run());

        match supervisor {
            Some(handle) => handle.join().await?,
            None => shutdown.cancelled().await,
        }

        acceptor_handle.await?;
        maintenance.await?;

        info!("Bye");
        Ok(())
    }
}

async fn stop_supervisor(supervisor: Option<SupervisorHandle>) {
    if let Some(handle) = supervisor {
        if let Err(e) = handle.join().await {
            error!(error = %e, "Supervisor did not stop cleanly");
        }
    }
}
