//! Subscriber registry
//!
//! The set of chat ids that receive periodic BBO updates, persisted to a
//! JSON file after every change.

mod store;

pub use store::JsonFileStore;

use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Telegram chat identifier
pub type ChatId = i64;

/// Mutable set of recipients
///
/// Memory is authoritative for the running process: a failed save is logged
/// and the mutation still stands.
#[derive(Debug)]
pub struct SubscriberRegistry {
    ids: Mutex<BTreeSet<ChatId>>,
    store: Option<JsonFileStore>,
}

impl SubscriberRegistry {
    /// Registry without persistence
    pub fn in_memory() -> Self {
        Self {
            ids: Mutex::new(BTreeSet::new()),
            store: None,
        }
    }

    /// Load persisted ids; an unreadable file degrades to an empty set
    pub async fn load(store: JsonFileStore) -> Self {
        let ids = match store.load().await {
            Ok(ids) => {
                info!(count = ids.len(), path = %store.path().display(), "Loaded subscribers");
                ids
            }
            Err(e) => {
                warn!(error = %e, "Could not load subscribers, starting empty");
                BTreeSet::new()
            }
        };

        Self {
            ids: Mutex::new(ids),
            store: Some(store),
        }
    }

    /// Add a recipient. Returns false if it was already subscribed.
    pub async fn subscribe(&self, id: ChatId) -> bool {
        let mut ids = self.ids.lock().await;
        if !ids.insert(id) {
            return false;
        }
        info!(chat_id = id, total = ids.len(), "Subscriber added");
        self.persist(&ids).await;
        true
    }

    /// Remove a recipient. Returns false if it was not subscribed.
    pub async fn unsubscribe(&self, id: ChatId) -> bool {
        let mut ids = self.ids.lock().await;
        if !ids.remove(&id) {
            return false;
        }
        info!(chat_id = id, total = ids.len(), "Subscriber removed");
        self.persist(&ids).await;
        true
    }

    pub async fn ids(&self) -> Vec<ChatId> {
        self.ids.lock().await.iter().copied().collect()
    }

    pub async fn contains(&self, id: ChatId) -> bool {
        self.ids.lock().await.contains(&id)
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    // Called with the lock held so file writes follow mutation order
    async fn persist(&self, ids: &BTreeSet<ChatId>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(ids).await {
                warn!(error = %e, "Failed to persist subscribers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let registry = SubscriberRegistry::in_memory();
        assert!(registry.subscribe(1).await);
        assert!(!registry.subscribe(1).await);
        assert_eq!(registry.ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_id() {
        let registry = SubscriberRegistry::in_memory();
        assert!(!registry.unsubscribe(9).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unwritable_store_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("missing-dir").join("subscribers.json"));
        let registry = SubscriberRegistry::load(store).await;

        assert!(registry.subscribe(5).await);
        assert!(registry.contains(5).await);
        assert_eq!(registry.len().await, 1);
    }
}
