pub mod backend;
pub mod client;
pub mod registry;
pub mod traits;

pub use backend::BackendClient;
pub use client::StorageClient;
pub use registry::CollectionRegistry;
pub use traits::{RecordStore, StorageError};
