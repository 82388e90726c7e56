pub mod acceptor;
pub mod maintenance;
pub mod runner;
pub mod session;

pub use acceptor::Acceptor;
pub use runner::{ServerError, ServerRunner};
pub use session::{IngestionSession, SessionSummary};
