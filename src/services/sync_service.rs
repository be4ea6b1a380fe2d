use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheError, TtlCache},
    provider::{Endpoint, FixtureProvider, ProviderError, adapter},
    state::{
        classifier::classify_events,
        fixture::{Fixture, MatchSnapshot, Score, SharedSnapshot},
    },
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Timing knobs of the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Delay between refreshes of a live fixture.
    pub poll_interval: Duration,
    /// Ceiling of the retry delay after consecutive failures.
    pub max_backoff: Duration,
    pub fixture_ttl: Duration,
    pub events_ttl: Duration,
    pub statistics_ttl: Duration,
    /// Lineups rarely change, so they are cached much longer.
    pub lineups_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            fixture_ttl: Duration::from_secs(10),
            events_ttl: Duration::from_secs(10),
            statistics_ttl: Duration::from_secs(10),
            lineups_ttl: Duration::from_secs(600),
        }
    }
}

impl SyncSettings {
    fn ttl(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::Fixture => self.fixture_ttl,
            Endpoint::Events => self.events_ttl,
            Endpoint::Statistics => self.statistics_ttl,
            Endpoint::Lineups => self.lineups_ttl,
        }
    }
}

/// Failures of a snapshot refresh, cloned into every published [`SyncState`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The id is not a positive integer.
    #[error("invalid fixture id `{0}`")]
    InvalidId(String),
    /// The provider knows no fixture with this id.
    #[error("fixture {0} not found")]
    NotFound(u64),
    /// A provider request exceeded the fetch timeout.
    #[error("provider timed out on `{endpoint}`")]
    UpstreamTimeout { endpoint: Endpoint },
    /// The provider answered with an error; `message` flattens its causes.
    #[error("provider failure on `{endpoint}`: {message}")]
    UpstreamFailure { endpoint: Endpoint, message: String },
}

impl SyncError {
    /// Terminal errors stop polling; the others are retried on the next tick.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncError::InvalidId(_) | SyncError::NotFound(_))
    }

    fn upstream(endpoint: Endpoint, err: &dyn std::error::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        SyncError::UpstreamFailure { endpoint, message }
    }

    fn from_cache(endpoint: Endpoint, err: CacheError) -> Self {
        match err {
            CacheError::Timeout { .. } => SyncError::UpstreamTimeout { endpoint },
            other => SyncError::upstream(endpoint, &other),
        }
    }
}

/// Parse a fixture identifier; zero and non-numeric ids are rejected.
pub fn parse_fixture_id(raw: &str) -> Result<u64, SyncError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(SyncError::InvalidId(raw.to_string())),
    }
}

/// Latest outcome published for one fixture.
#[derive(Debug, Clone)]
pub enum SyncState {
    Loading,
    Ready(SharedSnapshot),
    /// The refresh failed; `last` keeps the most recent good snapshot.
    Failed {
        error: SyncError,
        last: Option<SharedSnapshot>,
    },
}

impl SyncState {
    /// Snapshot to display: the fresh one, or the last good one after a failure.
    pub fn snapshot(&self) -> Option<&SharedSnapshot> {
        match self {
            SyncState::Loading => None,
            SyncState::Ready(snapshot) => Some(snapshot),
            SyncState::Failed { last, .. } => last.as_ref(),
        }
    }
}

/// Poll delay after `failures` consecutive recoverable failures.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return base;
    }
    base.saturating_mul(1u32 << failures.min(16)).min(max)
}

struct PollTask {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    provider: Arc<dyn FixtureProvider>,
    cache: TtlCache,
    settings: SyncSettings,
    channels: DashMap<u64, watch::Sender<SyncState>>,
    tasks: DashMap<u64, PollTask>,
    watchers: DashMap<u64, usize>,
    last_goals: DashMap<u64, Score>,
    generation: AtomicU64,
}

/// Fetches, assembles and keeps refreshing match snapshots.
#[derive(Clone)]
pub struct LiveMatchSynchronizer {
    inner: Arc<Inner>,
}

impl LiveMatchSynchronizer {
    pub fn new(provider: Arc<dyn FixtureProvider>, cache: TtlCache, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                cache,
                settings,
                channels: DashMap::new(),
                tasks: DashMap::new(),
                watchers: DashMap::new(),
                last_goals: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// One-shot snapshot through the cache.
    pub async fn fetch_snapshot(&self, fixture_id: &str) -> Result<MatchSnapshot, SyncError> {
        let id = parse_fixture_id(fixture_id)?;
        self.fetch_by_id(id).await
    }

    /// Fixture record alone, from the latest published snapshot when there is one.
    pub async fn fixture(&self, fixture_id: &str) -> Result<Fixture, SyncError> {
        let id = parse_fixture_id(fixture_id)?;
        if let Some(snapshot) = self.latest(id) {
            return Ok(snapshot.fixture.clone());
        }
        let items = self.fetch_endpoint(Endpoint::Fixture, id).await;
        self.read_fixture(id, items)
    }

    async fn fetch_by_id(&self, id: u64) -> Result<MatchSnapshot, SyncError> {
        let (fixture, events, statistics, lineups) = tokio::join!(
            self.fetch_endpoint(Endpoint::Fixture, id),
            self.fetch_endpoint(Endpoint::Events, id),
            self.fetch_endpoint(Endpoint::Statistics, id),
            self.fetch_endpoint(Endpoint::Lineups, id),
        );

        let mut fixture = self.read_fixture(id, fixture)?;
        self.clamp_goals(&mut fixture);

        let raw_events = adapter::parse_events(degrade(Endpoint::Events, id, events));
        let events = classify_events(&fixture, &raw_events);
        let statistics = adapter::parse_statistics(degrade(Endpoint::Statistics, id, statistics));
        let lineups = adapter::parse_lineups(degrade(Endpoint::Lineups, id, lineups));

        Ok(MatchSnapshot {
            fixture,
            events,
            statistics,
            lineups,
            fetched_at: SystemTime::now(),
        })
    }

    async fn fetch_endpoint(
        &self,
        endpoint: Endpoint,
        fixture_id: u64,
    ) -> Result<Option<Vec<Value>>, CacheError> {
        let provider = self.inner.provider.clone();
        self.inner
            .cache
            .get_or_fetch(
                &endpoint.cache_key(fixture_id),
                self.inner.settings.ttl(endpoint),
                move || {
                    let request = provider.fetch(endpoint, fixture_id);
                    async move {
                        let items = request.await?;
                        Ok::<_, ProviderError>((!items.is_empty()).then_some(items))
                    }
                },
            )
            .await
    }

    fn read_fixture(
        &self,
        id: u64,
        items: Result<Option<Vec<Value>>, CacheError>,
    ) -> Result<Fixture, SyncError> {
        let items = items
            .map_err(|err| SyncError::from_cache(Endpoint::Fixture, err))?
            .ok_or(SyncError::NotFound(id))?;
        adapter::parse_fixture(items)
            .map_err(|err| SyncError::upstream(Endpoint::Fixture, &err))?
            .ok_or(SyncError::NotFound(id))
    }

    /// Keep the provider tally from going backwards while the match is on.
    fn clamp_goals(&self, fixture: &mut Fixture) {
        if !fixture.status.is_active() {
            self.inner.last_goals.remove(&fixture.id);
            return;
        }
        let mut last = self.inner.last_goals.entry(fixture.id).or_default();
        if fixture.goals.home < last.home || fixture.goals.away < last.away {
            warn!(
                fixture_id = fixture.id,
                reported = ?fixture.goals,
                kept = ?*last,
                "provider score went backwards; keeping last observed tally"
            );
        }
        last.home = last.home.max(fixture.goals.home);
        last.away = last.away.max(fixture.goals.away);
        fixture.goals = *last;
    }

    fn channel(&self, fixture_id: u64) -> watch::Sender<SyncState> {
        self.inner
            .channels
            .entry(fixture_id)
            .or_insert_with(|| watch::channel(SyncState::Loading).0)
            .clone()
    }

    /// Receiver of the fixture's sync state, without starting a poller.
    pub fn subscribe(&self, fixture_id: u64) -> watch::Receiver<SyncState> {
        self.channel(fixture_id).subscribe()
    }

    /// Most recent good snapshot, if any was published.
    pub fn latest(&self, fixture_id: u64) -> Option<SharedSnapshot> {
        let sender = self.inner.channels.get(&fixture_id)?;
        let state = sender.borrow();
        state.snapshot().cloned()
    }

    /// Match minute of the latest published snapshot.
    pub fn current_minute(&self, fixture_id: u64) -> Option<u16> {
        self.latest(fixture_id)?.fixture.match_minute()
    }

    /// Whether a poller for `fixture_id` is alive.
    pub fn is_polling(&self, fixture_id: u64) -> bool {
        self.inner
            .tasks
            .get(&fixture_id)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Number of fixtures with a running poller.
    pub fn polling_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    /// Spawn the poller for `fixture_id`, replacing any existing one.
    pub fn start_polling(&self, fixture_id: u64) -> watch::Receiver<SyncState> {
        let receiver = self.subscribe(fixture_id);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let handle = tokio::spawn(async move { this.poll_loop(fixture_id, generation).await });

        if let Some(previous) = self
            .inner
            .tasks
            .insert(fixture_id, PollTask { generation, handle })
        {
            previous.handle.abort();
            debug!(fixture_id, "replaced existing poller");
        }
        info!(fixture_id, "polling started");
        receiver
    }

    /// Abort the poller of `fixture_id`. Returns whether one was running.
    pub fn stop_polling(&self, fixture_id: u64) -> bool {
        let stopped = Self::abort_task(fixture_id, self.inner.tasks.remove(&fixture_id));
        self.prune_channel(fixture_id);
        stopped
    }

    /// Like [`stop_polling`](Self::stop_polling), but only while the running
    /// poller is still the one started as `generation`.
    fn stop_generation(&self, fixture_id: u64, generation: u64) -> bool {
        let removed = self
            .inner
            .tasks
            .remove_if(&fixture_id, |_, task| task.generation == generation);
        Self::abort_task(fixture_id, removed)
    }

    fn abort_task(fixture_id: u64, removed: Option<(u64, PollTask)>) -> bool {
        match removed {
            Some((_, task)) => {
                let running = !task.handle.is_finished();
                task.handle.abort();
                info!(fixture_id, "polling stopped");
                running
            }
            None => false,
        }
    }

    /// Forget the state channel once nothing polls or listens to it.
    fn prune_channel(&self, fixture_id: u64) {
        if self.is_polling(fixture_id) {
            return;
        }
        if self
            .inner
            .channels
            .remove_if(&fixture_id, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            debug!(fixture_id, "dropped idle sync channel");
        }
    }

    /// Register a live watcher; polling runs while at least one guard is alive.
    pub fn watch(&self, fixture_id: u64) -> FixtureWatch {
        let first = {
            let mut count = self.inner.watchers.entry(fixture_id).or_insert(0);
            *count += 1;
            *count == 1
        };
        let receiver = if first || !self.is_polling(fixture_id) {
            self.start_polling(fixture_id)
        } else {
            self.subscribe(fixture_id)
        };
        FixtureWatch {
            receiver,
            guard: WatchGuard {
                synchronizer: self.clone(),
                fixture_id,
            },
        }
    }

    fn release_watcher(&self, fixture_id: u64) {
        let mut last_generation = None;
        let removed = self
            .inner
            .watchers
            .remove_if_mut(&fixture_id, |_, count| {
                *count = count.saturating_sub(1);
                if *count > 0 {
                    return false;
                }
                // Read under the entry lock: a concurrent watch() waits for it,
                // so any poller it starts has a newer generation.
                last_generation = self.inner.tasks.get(&fixture_id).map(|task| task.generation);
                true
            })
            .is_some();
        if !removed {
            return;
        }
        debug!(fixture_id, "last watcher left");
        if let Some(generation) = last_generation {
            self.stop_generation(fixture_id, generation);
        }
        self.prune_channel(fixture_id);
    }

    async fn poll_loop(self, fixture_id: u64, generation: u64) {
        let sender = self.channel(fixture_id);
        let settings = self.inner.settings.clone();
        let mut last = sender.borrow().snapshot().cloned();
        let mut failures = 0u32;

        loop {
            match self.fetch_by_id(fixture_id).await {
                Ok(snapshot) => {
                    failures = 0;
                    let status = snapshot.fixture.status;
                    let snapshot = Arc::new(snapshot);
                    last = Some(snapshot.clone());
                    sender.send_replace(SyncState::Ready(snapshot));

                    if !status.is_active() {
                        info!(fixture_id, ?status, "fixture not in play; polling finished");
                        break;
                    }
                    sleep(settings.poll_interval).await;
                }
                Err(error) if error.is_terminal() => {
                    warn!(fixture_id, error = %error, "snapshot refresh failed permanently");
                    sender.send_replace(SyncState::Failed {
                        error,
                        last: last.clone(),
                    });
                    break;
                }
                Err(error) => {
                    failures += 1;
                    let delay =
                        backoff_delay(settings.poll_interval, settings.max_backoff, failures);
                    warn!(
                        fixture_id,
                        error = %error,
                        failures,
                        retry_in = ?delay,
                        "snapshot refresh failed"
                    );
                    sender.send_replace(SyncState::Failed {
                        error,
                        last: last.clone(),
                    });
                    sleep(delay).await;
                }
            }
        }

        self.inner
            .tasks
            .remove_if(&fixture_id, |_, task| task.generation == generation);
    }
}

fn degrade(
    endpoint: Endpoint,
    fixture_id: u64,
    result: Result<Option<Vec<Value>>, CacheError>,
) -> Vec<Value> {
    match result {
        Ok(items) => items.unwrap_or_default(),
        Err(err) => {
            warn!(fixture_id, %endpoint, error = %err, "section unavailable; using empty data");
            Vec::new()
        }
    }
}

/// Live view on a fixture; dropping the guard releases the watcher slot.
pub struct FixtureWatch {
    pub receiver: watch::Receiver<SyncState>,
    pub guard: WatchGuard,
}

/// Releases its watcher slot on drop.
pub struct WatchGuard {
    synchronizer: LiveMatchSynchronizer,
    fixture_id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.synchronizer.release_watcher(self.fixture_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize},
    };

    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use crate::state::fixture::{EventDetails, EventKind, FixtureStatus};

    #[derive(Default)]
    struct FakeProvider {
        fixture: Mutex<Vec<Value>>,
        events: Mutex<Vec<Value>>,
        fail_fixture: AtomicBool,
        fail_events: AtomicBool,
        fixture_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn with_fixture(short: &str, home: u16, away: u16) -> Arc<Self> {
            let provider = Arc::new(Self::default());
            provider.set_fixture(short, home, away);
            provider
        }

        fn set_fixture(&self, short: &str, home: u16, away: u16) {
            *self.fixture.lock().unwrap() = vec![json!({
                "fixture": {
                    "id": 77,
                    "date": "2026-03-01T15:00:00+00:00",
                    "status": { "short": short, "elapsed": 30 }
                },
                "league": { "id": 39, "name": "Premier League" },
                "teams": {
                    "home": { "id": 1, "name": "Home FC" },
                    "away": { "id": 2, "name": "Away FC" }
                },
                "goals": { "home": home, "away": away }
            })];
        }
    }

    impl FixtureProvider for FakeProvider {
        fn fetch(
            &self,
            endpoint: Endpoint,
            _fixture_id: u64,
        ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>> {
            let rejected = |endpoint| ProviderError::Rejected {
                endpoint,
                message: "quota exceeded".into(),
            };
            let result = match endpoint {
                Endpoint::Fixture => {
                    self.fixture_calls.fetch_add(1, Ordering::SeqCst);
                    if self.fail_fixture.load(Ordering::SeqCst) {
                        Err(rejected(endpoint))
                    } else {
                        Ok(self.fixture.lock().unwrap().clone())
                    }
                }
                Endpoint::Events if self.fail_events.load(Ordering::SeqCst) => {
                    Err(rejected(endpoint))
                }
                Endpoint::Events => Ok(self.events.lock().unwrap().clone()),
                Endpoint::Statistics | Endpoint::Lineups => Ok(Vec::new()),
            };
            Box::pin(async move { result })
        }
    }

    fn uncached() -> SyncSettings {
        SyncSettings {
            fixture_ttl: Duration::ZERO,
            events_ttl: Duration::ZERO,
            statistics_ttl: Duration::ZERO,
            lineups_ttl: Duration::ZERO,
            ..SyncSettings::default()
        }
    }

    fn synchronizer(provider: Arc<FakeProvider>) -> LiveMatchSynchronizer {
        LiveMatchSynchronizer::new(provider, TtlCache::in_memory("test"), uncached())
    }

    #[tokio::test]
    async fn rejects_malformed_ids() {
        let sync = synchronizer(FakeProvider::with_fixture("1H", 0, 0));
        for raw in ["abc", "0", "", "-4"] {
            assert_eq!(
                sync.fetch_snapshot(raw).await.unwrap_err(),
                SyncError::InvalidId(raw.to_string())
            );
        }
    }

    #[tokio::test]
    async fn empty_fixture_response_is_not_found() {
        let sync = synchronizer(Arc::new(FakeProvider::default()));
        assert_eq!(sync.fetch_snapshot("77").await.unwrap_err(), SyncError::NotFound(77));
    }

    #[tokio::test]
    async fn failing_events_degrade_to_empty_timeline() {
        let provider = FakeProvider::with_fixture("2H", 1, 0);
        provider.fail_events.store(true, Ordering::SeqCst);
        let sync = synchronizer(provider);

        let snapshot = sync.fetch_snapshot("77").await.unwrap();
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.fixture.status, FixtureStatus::SecondHalf);
    }

    #[tokio::test]
    async fn snapshot_carries_classified_events() {
        let provider = FakeProvider::with_fixture("2H", 1, 0);
        *provider.events.lock().unwrap() = vec![json!({
            "time": { "elapsed": 12 },
            "team": { "id": 1 },
            "player": { "name": "Striker" },
            "type": "Goal",
            "detail": "Normal Goal"
        })];
        let sync = synchronizer(provider);

        let snapshot = sync.fetch_snapshot("77").await.unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].kind, EventKind::Goal);
        assert!(matches!(
            snapshot.events[0].details,
            EventDetails::Goal { score_after: Score { home: 1, away: 0 }, .. }
        ));
    }

    #[tokio::test]
    async fn regressing_score_is_clamped_while_in_play() {
        let provider = FakeProvider::with_fixture("2H", 2, 1);
        let sync = synchronizer(provider.clone());
        sync.fetch_snapshot("77").await.unwrap();

        provider.set_fixture("2H", 1, 1);
        let snapshot = sync.fetch_snapshot("77").await.unwrap();
        assert_eq!(snapshot.fixture.goals, Score { home: 2, away: 1 });
    }

    #[tokio::test]
    async fn upstream_timeout_is_reported_as_such() {
        struct Hanging;
        impl FixtureProvider for Hanging {
            fn fetch(
                &self,
                _endpoint: Endpoint,
                _fixture_id: u64,
            ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>> {
                Box::pin(futures::future::pending())
            }
        }

        let cache = TtlCache::new(
            Arc::new(crate::cache::MemoryDurableCache::new()),
            "test",
            Duration::from_millis(20),
        );
        let sync = LiveMatchSynchronizer::new(Arc::new(Hanging), cache, uncached());
        assert_eq!(
            sync.fetch_snapshot("77").await.unwrap_err(),
            SyncError::UpstreamTimeout {
                endpoint: Endpoint::Fixture
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polling_repeats_while_fixture_is_live() {
        let provider = FakeProvider::with_fixture("1H", 0, 0);
        let sync = synchronizer(provider.clone());

        let mut rx = sync.start_polling(77);
        rx.changed().await.unwrap();
        assert!(matches!(*rx.borrow(), SyncState::Ready(_)));

        sleep(Duration::from_secs(31)).await;
        assert!(provider.fixture_calls.load(Ordering::SeqCst) >= 3);
        assert!(sync.is_polling(77));
        assert_eq!(sync.polling_count(), 1);
        assert_eq!(sync.current_minute(77), Some(30));
        assert!(sync.stop_polling(77));
        assert_eq!(sync.polling_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_ends_once_fixture_is_finished() {
        let provider = FakeProvider::with_fixture("FT", 3, 2);
        let sync = synchronizer(provider.clone());

        let mut rx = sync.start_polling(77);
        rx.changed().await.unwrap();
        sleep(Duration::from_secs(60)).await;

        assert_eq!(provider.fixture_calls.load(Ordering::SeqCst), 1);
        assert!(!sync.is_polling(77));
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_failures_keep_last_snapshot_and_retry() {
        let provider = FakeProvider::with_fixture("1H", 1, 0);
        let sync = synchronizer(provider.clone());

        let mut rx = sync.start_polling(77);
        rx.changed().await.unwrap();
        provider.fail_fixture.store(true, Ordering::SeqCst);

        rx.changed().await.unwrap();
        match &*rx.borrow() {
            SyncState::Failed { error, last } => {
                assert!(!error.is_terminal());
                assert_eq!(last.as_ref().unwrap().fixture.goals.home, 1);
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(sync.is_polling(77));

        provider.fail_fixture.store(false, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(matches!(*rx.borrow(), SyncState::Ready(_)));
        sync.stop_polling(77);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fixture_stops_polling() {
        let sync = synchronizer(Arc::new(FakeProvider::default()));

        let mut rx = sync.start_polling(77);
        rx.changed().await.unwrap();
        assert!(matches!(
            *rx.borrow(),
            SyncState::Failed {
                error: SyncError::NotFound(77),
                ..
            }
        ));
        sleep(Duration::from_millis(1)).await;
        assert!(!sync.is_polling(77));
    }

    #[tokio::test(start_paused = true)]
    async fn last_watcher_stops_the_poller() {
        let sync = synchronizer(FakeProvider::with_fixture("1H", 0, 0));

        let first = sync.watch(77);
        let second = sync.watch(77);
        assert!(sync.is_polling(77));

        drop(first);
        assert!(sync.is_polling(77));
        drop(second);
        assert!(!sync.is_polling(77));
    }

    #[tokio::test(start_paused = true)]
    async fn a_late_stop_leaves_the_newer_poller_running() {
        let sync = synchronizer(FakeProvider::with_fixture("1H", 0, 0));

        let first = sync.watch(77);
        let stale_generation = sync.inner.tasks.get(&77).unwrap().generation;
        drop(first);

        // A new viewer arrives before the previous release got to stop its poller.
        let _second = sync.watch(77);
        assert!(!sync.stop_generation(77, stale_generation));
        assert!(sync.is_polling(77));
    }

    #[tokio::test(start_paused = true)]
    async fn rewatching_after_the_last_release_restarts_polling() {
        let sync = synchronizer(FakeProvider::with_fixture("1H", 0, 0));

        for _ in 0..3 {
            let mut watch = sync.watch(77);
            watch.receiver.changed().await.unwrap();
            assert!(sync.is_polling(77));
            drop(watch);
            assert!(!sync.is_polling(77));
        }
        assert!(sync.inner.watchers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_channels_are_dropped() {
        let sync = synchronizer(FakeProvider::with_fixture("1H", 0, 0));

        let watch = sync.watch(77);
        assert_eq!(sync.inner.channels.len(), 1);
        drop(watch);
        assert!(sync.inner.channels.is_empty());
        assert!(sync.latest(77).is_none());

        let rx = sync.start_polling(78);
        assert!(sync.stop_polling(78));
        assert_eq!(sync.inner.channels.len(), 1);
        drop(rx);
        sync.stop_polling(78);
        assert!(sync.inner.channels.is_empty());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_secs(15);
        let max = Duration::from_secs(120);
        assert_eq!(backoff_delay(base, max, 0), base);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(30));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, max, 3), max);
        assert_eq!(backoff_delay(base, max, 40), max);
    }
}
