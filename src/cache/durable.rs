use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;

/// Slow, persistent tier of the [`TtlCache`](super::TtlCache): plain strings
/// keyed by an already namespaced key.
pub trait DurableCache: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;
    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}

/// Process-local durable tier, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryDurableCache {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryDurableCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableCache for MemoryDurableCache {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}
