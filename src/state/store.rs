use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{dao::chat_store::ChatStore, error::ServiceError};

/// Swappable slot holding the chat store plus the degraded flag derived from it.
///
/// The storage supervisor installs and clears the store; every engine keeps a
/// clone of the handle and resolves the current store per operation.
#[derive(Clone)]
pub struct StoreHandle {
    slot: Arc<RwLock<Option<Arc<dyn ChatStore>>>>,
    degraded: Arc<watch::Sender<bool>>,
}

impl StoreHandle {
    /// Empty slot; starts in degraded mode until a store is installed.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            slot: Arc::new(RwLock::new(None)),
            degraded: Arc::new(degraded),
        }
    }

    /// Slot pre-filled with `store`.
    pub fn with_store(store: Arc<dyn ChatStore>) -> Self {
        let (degraded, _rx) = watch::channel(false);
        Self {
            slot: Arc::new(RwLock::new(Some(store))),
            degraded: Arc::new(degraded),
        }
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require(&self) -> Result<Arc<dyn ChatStore>, ServiceError> {
        self.slot
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(ServiceError::Degraded)
    }

    /// Install a store and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn ChatStore>) {
        *self.slot.write().await = Some(store);
        self.update_degraded(false);
    }

    /// True while no chat store is installed.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Receiver notified whenever the degraded flag flips.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when it changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new()
    }
}
