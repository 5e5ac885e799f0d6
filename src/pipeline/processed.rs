//! Processed-message bookkeeping.
//!
//! Entries are only ever added, never removed. The in-memory set covers one
//! process lifetime; mailbox read state is the durable record.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Store of message identifiers already handled.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    async fn contains(&self, id: &str) -> bool;

    /// Record `id`. Returns `false` if it was already present.
    async fn insert(&self, id: &str) -> bool;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// `ProcessedStore` backed by a `HashSet`. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryProcessedSet {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedStore for InMemoryProcessedSet {
    async fn contains(&self, id: &str) -> bool {
        self.ids.read().await.contains(id)
    }

    async fn insert(&self, id: &str) -> bool {
        self.ids.write().await.insert(id.to_string())
    }

    async fn len(&self) -> usize {
        self.ids.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_contains() {
        let set = InMemoryProcessedSet::new();
        assert!(!set.contains("42").await);
        assert!(set.insert("42").await);
        assert!(set.contains("42").await);
        assert_eq!(set.len().await, 1);
    }

    #[tokio::test]
    async fn second_insert_reports_duplicate() {
        let set = InMemoryProcessedSet::new();
        assert!(set.insert("a").await);
        assert!(!set.insert("a").await);
        assert_eq!(set.len().await, 1);
    }
}
