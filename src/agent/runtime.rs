use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, LogOutput, LogsOptions};
use bollard::system::EventsOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("invalid docker socket path: {0}")]
    InvalidSocket(String),
}

/// Identity of a workload as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: String,
    pub name: String,
    pub running: bool,
}

impl Workload {
    /// Display name without the runtime's leading slash or padding.
    pub fn display_name(&self) -> &str {
        self.name.trim_matches(|c: char| c == '/' || c.is_whitespace())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub id: String,
    pub status: String,
}

impl LifecycleEvent {
    pub fn is_start(&self) -> bool {
        self.status == "start"
    }
}

/// What the agent needs from a container runtime.
#[async_trait]
pub trait WorkloadRuntime: Send + Sync + 'static {
    /// Ids of all known workloads, running or not.
    async fn list_workloads(&self) -> Result<Vec<String>, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<Workload, RuntimeError>;

    /// Lifecycle events from now on. Dropping the stream unsubscribes.
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, RuntimeError>>;

    /// Combined stdout/stderr of a workload, following, starting at `since`
    /// (unix seconds).
    fn output(&self, id: &str, since: i64) -> BoxStream<'static, Result<Bytes, RuntimeError>>;
}

/// Docker Engine API over its unix socket.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(socket: &Path) -> Result<Self, RuntimeError> {
        let socket = socket
            .to_str()
            .ok_or_else(|| RuntimeError::InvalidSocket(socket.display().to_string()))?;
        let docker = Docker::connect_with_unix(socket, 120, bollard::API_DEFAULT_VERSION)?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl WorkloadRuntime for DockerRuntime {
    async fn list_workloads(&self) -> Result<Vec<String>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, id: &str) -> Result<Workload, RuntimeError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        Ok(Workload {
            id: details.id.unwrap_or_else(|| id.to_string()),
            name: details.name.unwrap_or_default(),
            running: details.state.and_then(|s| s.running).unwrap_or(false),
        })
    }

    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent, RuntimeError>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);

        self.docker
            .events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }))
            .filter_map(|event| async move {
                match event {
                    Ok(message) => {
                        let id = message.actor.and_then(|actor| actor.id)?;
                        let status = message.action.unwrap_or_default();
                        Some(Ok(LifecycleEvent { id, status }))
                    }
                    Err(e) => Some(Err(RuntimeError::from(e))),
                }
            })
            .boxed()
    }

    fn output(&self, id: &str, since: i64) -> BoxStream<'static, Result<Bytes, RuntimeError>> {
        self.docker
            .logs(
                id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    since,
                    tail: "all".to_string(),
                    ..Default::default()
                }),
            )
            .map(|chunk| {
                chunk.map_err(RuntimeError::from).map(|output| match output {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::StdIn { message }
                    | LogOutput::Console { message } => message,
                })
            })
            .boxed()
    }
}
