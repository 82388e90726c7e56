pub mod monitor;
pub mod reader;
pub mod runner;
pub mod runtime;
pub mod sender;

pub use monitor::{spawn_workload_stream, MonitorExit, StreamSettings, WorkloadMonitor, WorkloadStream};
pub use reader::{split_lines, StreamState, WorkloadReader};
pub use runner::{AgentError, AgentRunner};
pub use runtime::{DockerRuntime, LifecycleEvent, Workload, WorkloadRuntime};
pub use sender::{Connector, RecordSender, SenderError, TcpConnector};
