use std::collections::HashSet;
use tokio::sync::RwLock;

/// Collection names known to exist in the backend.
///
/// Grows monotonically; the backend stays the source of truth, so nothing
/// is ever removed or persisted here.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    known: RwLock<HashSet<String>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn exists(&self, collection: &str) -> bool {
        self.known.read().await.contains(collection)
    }

    /// Returns true if the name was not already known.
    pub async fn mark_existing(&self, collection: &str) -> bool {
        self.known.write().await.insert(collection.to_string())
    }

    /// Merge a listing fetched from the backend.
    pub async fn seed<I>(&self, collections: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut known = self.known.write().await;
        let before = known.len();
        known.extend(collections);
        known.len() - before
    }

    pub async fn len(&self) -> usize {
        self.known.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.known.read().await.is_empty()
    }

    /// Sorted snapshot, for logging.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.known.read().await.iter().cloned().collect();
        names.sort();
        names
    }
}
