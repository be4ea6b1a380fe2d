//! Two-tier read-through cache with request coalescing.
//!
//! The memory tier answers synchronously; the durable tier survives restarts.
//! Concurrent [`TtlCache::get_or_fetch`] calls for the same key share one
//! upstream fetch, and failed fetches are never cached.

mod durable;

use std::{
    error::Error as StdError,
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use self::durable::{DurableCache, MemoryDurableCache};

/// Upper bound for a single upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(12);

/// Failure shared by every caller coalesced onto one fetch.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The upstream fetch did not settle within the cache's fetch timeout.
    #[error("fetch for `{key}` timed out after {timeout:?}")]
    Timeout { key: String, timeout: Duration },
    /// The upstream fetch returned an error.
    #[error("fetch for `{key}` failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
    /// A cached value did not decode into the requested type.
    #[error("cached value for `{key}` could not be converted")]
    Codec {
        key: String,
        #[source]
        source: Arc<serde_json::Error>,
    },
}

/// Cached value together with the instant it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: Value,
    updated_at: SystemTime,
}

impl CacheEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            updated_at: SystemTime::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        match SystemTime::now().duration_since(self.updated_at) {
            Ok(age) => age < ttl,
            // Written "in the future" by a skewed clock; treat as just written.
            Err(_) => true,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Option<Value>, CacheError>>>;

struct Inner {
    memory: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, SharedFetch>,
    durable: Arc<dyn DurableCache>,
    namespace: String,
    fetch_timeout: Duration,
}

/// Cheaply cloneable handle to one cache instance, built once at startup.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<Inner>,
}

impl TtlCache {
    /// Cache backed by `durable`, with keys prefixed by `namespace` and each
    /// upstream fetch bounded by `fetch_timeout`.
    pub fn new(
        durable: Arc<dyn DurableCache>,
        namespace: impl Into<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: DashMap::new(),
                in_flight: DashMap::new(),
                durable,
                namespace: namespace.into(),
                fetch_timeout,
            }),
        }
    }

    /// In-memory cache over a process-local durable tier.
    pub fn in_memory(namespace: impl Into<String>) -> Self {
        Self::new(
            Arc::new(MemoryDurableCache::new()),
            namespace,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    fn durable_key(&self, key: &str) -> String {
        format!("{}::{}", self.inner.namespace, key)
    }

    /// Fresh value from the memory tier only.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let value = self.memory_value(key, ttl)?;
        serde_json::from_value(value).ok()
    }

    /// Fresh value from memory, falling back to the durable tier. Durable hits
    /// are promoted into memory.
    pub async fn get_async<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        if let Some(value) = self.get(key, ttl) {
            return Some(value);
        }
        let value = self.durable_value(key, ttl).await?;
        serde_json::from_value(value).ok()
    }

    /// Write both tiers. Durable failures are logged and otherwise ignored.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.store(key, value).await,
            Err(err) => warn!(key, error = %err, "cannot serialize cache value; skipping"),
        }
    }

    /// Drop a key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.inner.memory.remove(key);
        if let Err(err) = self.inner.durable.remove(&self.durable_key(key)).await {
            warn!(key, error = %err, "durable cache remove failed");
        }
    }

    /// Read-through lookup.
    ///
    /// A fresh memory hit returns immediately. Otherwise callers join the fetch
    /// already in flight for `key`, or start one that consults the durable tier
    /// and then runs `fetcher` under the fetch timeout. Only successful `Some`
    /// results are cached; errors reach every joined caller and the next call
    /// retries.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: StdError + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    {
        if let Some(value) = self.get(key, ttl) {
            return Ok(Some(value));
        }

        let shared = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!(key, "joining in-flight fetch");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let fetch = fetcher();
                let cache = self.clone();
                let owned_key = key.to_string();
                let shared = async move {
                    let outcome = cache.resolve(&owned_key, ttl, fetch).await;
                    cache.inner.in_flight.remove(&owned_key);
                    outcome
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                shared
            }
        };

        match shared.await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| CacheError::Codec {
                    key: key.to_string(),
                    source: Arc::new(source),
                }),
            None => Ok(None),
        }
    }

    async fn resolve<T, E, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: Fut,
    ) -> Result<Option<Value>, CacheError>
    where
        T: Serialize,
        E: StdError + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.durable_value(key, ttl).await {
            return Ok(Some(value));
        }

        let fetched = timeout(self.inner.fetch_timeout, fetch)
            .await
            .map_err(|_| CacheError::Timeout {
                key: key.to_string(),
                timeout: self.inner.fetch_timeout,
            })?
            .map_err(|source| CacheError::Fetch {
                key: key.to_string(),
                source: Arc::new(source),
            })?;

        let Some(fetched) = fetched else {
            return Ok(None);
        };

        let value = serde_json::to_value(&fetched).map_err(|source| CacheError::Codec {
            key: key.to_string(),
            source: Arc::new(source),
        })?;
        self.store(key, value.clone()).await;
        Ok(Some(value))
    }

    fn memory_value(&self, key: &str, ttl: Duration) -> Option<Value> {
        let entry = self.inner.memory.get(key)?;
        entry.is_fresh(ttl).then(|| entry.value.clone())
    }

    async fn durable_value(&self, key: &str, ttl: Duration) -> Option<Value> {
        let raw = match self.inner.durable.get(&self.durable_key(key)).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, error = %err, "durable cache read failed");
                return None;
            }
        };

        let entry = match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable durable cache entry");
                return None;
            }
        };

        if !entry.is_fresh(ttl) {
            return None;
        }
        let value = entry.value.clone();
        self.inner.memory.insert(key.to_string(), entry);
        Some(value)
    }

    async fn store(&self, key: &str, value: Value) {
        let entry = CacheEntry::new(value);
        let serialized = serde_json::to_string(&entry);
        self.inner.memory.insert(key.to_string(), entry);

        let serialized = match serialized {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(key, error = %err, "cannot encode durable cache entry");
                return;
            }
        };
        if let Err(err) = self
            .inner
            .durable
            .set(&self.durable_key(key), serialized)
            .await
        {
            warn!(key, error = %err, "durable cache write failed; keeping memory copy only");
        }
    }
}
