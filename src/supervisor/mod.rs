pub mod process;
pub mod runner;
pub mod state;

pub use runner::{BackendSupervisor, SupervisorError, SupervisorHandle};
pub use state::{BackendState, BackendStatus, SupervisorEvent};
