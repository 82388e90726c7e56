pub mod agent;
pub mod config;
pub mod pipeline;
pub mod record;
pub mod server;
pub mod signals;
pub mod storage;
pub mod supervisor;
