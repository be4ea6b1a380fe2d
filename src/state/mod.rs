pub mod chat_access;
pub mod classifier;
pub mod fixture;
pub mod optimistic;
pub mod store;
pub mod taps;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    cache::{DurableCache, TtlCache},
    config::AppConfig,
    provider::FixtureProvider,
    services::{
        chat_service::ChatRoomEngine, presence_service::PresenceTracker,
        sync_service::LiveMatchSynchronizer,
    },
};

use self::{chat_access::ChatAccessController, store::StoreHandle};

pub type SharedState = Arc<AppState>;

/// Central application state: the engines and the swappable store slot they share.
pub struct AppState {
    store: StoreHandle,
    synchronizer: LiveMatchSynchronizer,
    chat: ChatRoomEngine,
    presence: PresenceTracker,
    access: ChatAccessController,
}

impl AppState {
    /// Wire every component once. The cache is built here and injected into
    /// the synchronizer; nothing else constructs one.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn FixtureProvider>,
        durable: Arc<dyn DurableCache>,
        store: StoreHandle,
    ) -> SharedState {
        let cache = TtlCache::new(durable, config.cache_namespace.clone(), config.fetch_timeout);
        let synchronizer =
            LiveMatchSynchronizer::new(provider, cache, config.sync.clone());
        Arc::new(Self {
            chat: ChatRoomEngine::new(store.clone()),
            presence: PresenceTracker::new(store.clone()),
            access: ChatAccessController::new(config.eligibility.clone()),
            store,
            synchronizer,
        })
    }

    /// Store slot shared with the storage supervisor.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn synchronizer(&self) -> &LiveMatchSynchronizer {
        &self.synchronizer
    }

    pub fn chat(&self) -> &ChatRoomEngine {
        &self.chat
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn access(&self) -> &ChatAccessController {
        &self.access
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.store.degraded_watcher()
    }
}
