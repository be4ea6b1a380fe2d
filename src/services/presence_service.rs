use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{interval, sleep},
};
use tracing::{debug, info, warn};

use crate::{
    dao::{chat_store::ChatStore, models::PresenceEntity},
    error::ServiceError,
    state::store::StoreHandle,
};

/// How often an attached connection refreshes its record.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Records older than this no longer count and get swept.
pub const STALE_AFTER: Duration = Duration::from_secs(120);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Session {
    room_id: String,
    generation: u64,
    /// Present only while a live connection holds a [`PresenceGuard`].
    heartbeat: Option<JoinHandle<()>>,
}

impl Session {
    fn stop(self) {
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.abort();
        }
    }
}

struct Inner {
    store: StoreHandle,
    sessions: DashMap<String, Session>,
    counts: DashMap<String, watch::Sender<usize>>,
    heartbeat_interval: Duration,
    stale_after: Duration,
    generation: AtomicU64,
}

/// Who is in which room. One session per client; joining a room leaves the
/// previous one.
///
/// A plain [`join`](Self::join) writes the record once and the client keeps it
/// fresh by joining again. [`attach`](Self::attach) heartbeats on the client's
/// behalf for as long as the returned guard lives, which is how the room SSE
/// stream ties presence to the connection.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Inner>,
}

impl PresenceTracker {
    pub fn new(store: StoreHandle) -> Self {
        Self::with_timings(store, HEARTBEAT_INTERVAL, STALE_AFTER)
    }

    pub fn with_timings(store: StoreHandle, heartbeat_interval: Duration, stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sessions: DashMap::new(),
                counts: DashMap::new(),
                heartbeat_interval,
                stale_after,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Enter `room_id` (or refresh an existing entry) and return the room's
    /// active count. Nothing refreshes the record afterwards, so a client that
    /// stops joining drops out after [`STALE_AFTER`].
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<usize, ServiceError> {
        let store = self.inner.store.require().await?;

        let attached = self
            .inner
            .sessions
            .get(user_id)
            .is_some_and(|session| session.room_id == room_id && session.heartbeat.is_some());
        if !attached {
            self.leave_previous(store.as_ref(), room_id, user_id).await;
            self.replace_session(user_id, room_id, None);
        }

        store.put_presence(fresh_record(room_id, user_id, name)).await?;
        info!(room_id, user_id, "viewer joined");
        self.refresh_count(store.as_ref(), room_id).await
    }

    /// Enter `room_id` and heartbeat every interval until the guard is dropped.
    pub async fn attach(
        &self,
        room_id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<PresenceGuard, ServiceError> {
        let store = self.inner.store.require().await?;
        self.leave_previous(store.as_ref(), room_id, user_id).await;

        let record = fresh_record(room_id, user_id, name);
        store.put_presence(record.clone()).await?;
        let heartbeat = tokio::spawn(heartbeat(
            store.clone(),
            record,
            self.inner.heartbeat_interval,
        ));
        let generation = self.replace_session(user_id, room_id, Some(heartbeat));

        let guard = PresenceGuard {
            tracker: self.clone(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            generation,
        };
        info!(room_id, user_id, "viewer attached");
        self.refresh_count(store.as_ref(), room_id).await?;
        Ok(guard)
    }

    /// Leave `room_id`; leaving a room the user is not in is a no-op.
    pub async fn leave(&self, room_id: &str, user_id: &str) -> Result<usize, ServiceError> {
        if let Some((_, session)) = self
            .inner
            .sessions
            .remove_if(user_id, |_, session| session.room_id == room_id)
        {
            session.stop();
        }
        let active = self.remove_record(room_id, user_id).await?;
        info!(room_id, user_id, "viewer left");
        Ok(active)
    }

    /// Viewers whose last heartbeat is recent enough. Also republishes the count.
    pub async fn active_count(&self, room_id: &str) -> Result<usize, ServiceError> {
        let store = self.inner.store.require().await?;
        self.refresh_count(store.as_ref(), room_id).await
    }

    /// Receiver of the room's active count.
    pub fn subscribe_count(&self, room_id: &str) -> watch::Receiver<usize> {
        self.count_channel(room_id).subscribe()
    }

    /// Delete stale records of every known room. Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize, ServiceError> {
        let store = self.inner.store.require().await?;
        let rooms: Vec<String> = self
            .inner
            .counts
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for room_id in rooms {
            for record in store.list_presence(&room_id).await? {
                if self.is_stale(&record) {
                    store.delete_presence(&room_id, &record.user_id).await?;
                    self.inner.sessions.remove_if(&record.user_id, |_, session| {
                        session.room_id == room_id && session.heartbeat.is_none()
                    });
                    removed += 1;
                }
            }
            self.refresh_count(store.as_ref(), &room_id).await?;
        }
        if removed > 0 {
            debug!(removed, "pruned stale presence records");
        }
        Ok(removed)
    }

    /// Sweep forever at `every`.
    pub async fn run_sweeper(self, every: Duration) {
        loop {
            sleep(every).await;
            match self.sweep().await {
                Ok(_) => {}
                Err(ServiceError::Degraded) => debug!("presence sweep skipped (degraded mode)"),
                Err(err) => warn!(error = %err, "presence sweep failed"),
            }
        }
    }

    fn replace_session(
        &self,
        user_id: &str,
        room_id: &str,
        heartbeat: Option<JoinHandle<()>>,
    ) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.inner.sessions.insert(
            user_id.to_string(),
            Session {
                room_id: room_id.to_string(),
                generation,
                heartbeat,
            },
        ) {
            previous.stop();
        }
        generation
    }

    async fn leave_previous(&self, store: &dyn ChatStore, room_id: &str, user_id: &str) {
        let Some((_, previous)) = self.inner.sessions.remove(user_id) else {
            return;
        };
        let previous_room = previous.room_id.clone();
        previous.stop();
        if previous_room == room_id {
            return;
        }

        debug!(user_id, from = %previous_room, to = room_id, "switching rooms");
        if let Err(err) = store.delete_presence(&previous_room, user_id).await {
            warn!(room_id = %previous_room, user_id, error = %err, "failed to leave previous room");
        }
        if let Err(err) = self.refresh_count(store, &previous_room).await {
            warn!(room_id = %previous_room, error = %err, "failed to refresh presence count");
        }
    }

    /// Called when a guard goes away. A later join or attach of the same
    /// client bumps the generation, which turns this into a no-op.
    fn detach(&self, room_id: &str, user_id: &str, generation: u64) {
        let Some((_, session)) = self
            .inner
            .sessions
            .remove_if(user_id, |_, session| session.generation == generation)
        else {
            return;
        };
        session.stop();

        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let tracker = self.clone();
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        runtime.spawn(async move {
            match tracker.remove_record(&room_id, &user_id).await {
                Ok(_) => info!(room_id, user_id, "viewer disconnected"),
                Err(err) => warn!(room_id, user_id, error = %err, "failed to clear presence"),
            }
        });
    }

    async fn remove_record(&self, room_id: &str, user_id: &str) -> Result<usize, ServiceError> {
        let store = self.inner.store.require().await?;
        store.delete_presence(room_id, user_id).await?;
        self.refresh_count(store.as_ref(), room_id).await
    }

    fn is_stale(&self, record: &PresenceEntity) -> bool {
        SystemTime::now()
            .duration_since(record.last_seen)
            .is_ok_and(|age| age >= self.inner.stale_after)
    }

    async fn refresh_count(&self, store: &dyn ChatStore, room_id: &str) -> Result<usize, ServiceError> {
        let records = store.list_presence(room_id).await?;
        let count = records.iter().filter(|record| !self.is_stale(record)).count();

        // Empty room with nobody listening: forget its channel.
        let forgotten = records.is_empty()
            && self
                .inner
                .counts
                .remove_if(room_id, |_, sender| sender.receiver_count() == 0)
                .is_some();
        if !forgotten {
            self.count_channel(room_id).send_if_modified(|current| {
                let changed = *current != count;
                *current = count;
                changed
            });
        }
        Ok(count)
    }

    fn count_channel(&self, room_id: &str) -> watch::Sender<usize> {
        self.inner
            .counts
            .entry(room_id.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }
}

/// Keeps a viewer counted while alive; dropping it stops the heartbeat and
/// removes the record.
pub struct PresenceGuard {
    tracker: PresenceTracker,
    room_id: String,
    user_id: String,
    generation: u64,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.tracker
            .detach(&self.room_id, &self.user_id, self.generation);
    }
}

fn fresh_record(room_id: &str, user_id: &str, name: &str) -> PresenceEntity {
    let now = SystemTime::now();
    PresenceEntity {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        name: name.trim().to_string(),
        joined_at: now,
        last_seen: now,
    }
}

async fn heartbeat(store: Arc<dyn ChatStore>, mut record: PresenceEntity, every: Duration) {
    let mut ticker = interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        record.last_seen = SystemTime::now();
        if let Err(err) = store.put_presence(record.clone()).await {
            warn!(room_id = %record.room_id, user_id = %record.user_id, error = %err, "presence heartbeat failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::dao::chat_store::memory::MemoryChatStore;

    fn tracker() -> (PresenceTracker, MemoryChatStore) {
        let store = MemoryChatStore::new();
        let tracker = PresenceTracker::new(StoreHandle::with_store(Arc::new(store.clone())));
        (tracker, store)
    }

    fn stale_record(room_id: &str, user_id: &str) -> PresenceEntity {
        let long_ago = SystemTime::now() - Duration::from_secs(600);
        PresenceEntity {
            room_id: room_id.into(),
            user_id: user_id.into(),
            name: "Ghost".into(),
            joined_at: long_ago,
            last_seen: long_ago,
        }
    }

    async fn wait_for_count(counts: &mut watch::Receiver<usize>, expected: usize) {
        timeout(Duration::from_secs(1), counts.wait_for(|count| *count == expected))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn counts_follow_joins_and_leaves() {
        let (tracker, _store) = tracker();
        let counts = tracker.subscribe_count("match:1");

        assert_eq!(tracker.join("match:1", "a", "Ana").await.unwrap(), 1);
        assert_eq!(tracker.join("match:1", "b", "Ben").await.unwrap(), 2);
        assert_eq!(*counts.borrow(), 2);

        assert_eq!(tracker.leave("match:1", "a").await.unwrap(), 1);
        assert_eq!(*counts.borrow(), 1);
    }

    #[tokio::test]
    async fn joining_a_new_room_leaves_the_old_one() {
        let (tracker, _store) = tracker();
        tracker.join("match:1", "a", "Ana").await.unwrap();
        tracker.join("match:2", "a", "Ana").await.unwrap();

        assert_eq!(tracker.active_count("match:1").await.unwrap(), 0);
        assert_eq!(tracker.active_count("match:2").await.unwrap(), 1);
        assert_eq!(*tracker.subscribe_count("match:1").borrow(), 0);
    }

    #[tokio::test]
    async fn stale_records_are_ignored_then_swept() {
        let (tracker, store) = tracker();
        tracker.join("match:1", "a", "Ana").await.unwrap();
        store.put_presence(stale_record("match:1", "ghost")).await.unwrap();

        assert_eq!(tracker.active_count("match:1").await.unwrap(), 1);
        assert_eq!(tracker.sweep().await.unwrap(), 1);
        assert_eq!(store.list_presence("match:1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_client_that_stops_joining_drops_out() {
        let store = MemoryChatStore::new();
        let tracker = PresenceTracker::with_timings(
            StoreHandle::with_store(Arc::new(store.clone())),
            HEARTBEAT_INTERVAL,
            Duration::from_millis(50),
        );
        assert_eq!(tracker.join("match:1", "gone", "Gil").await.unwrap(), 1);

        sleep(Duration::from_millis(80)).await;
        assert_eq!(tracker.active_count("match:1").await.unwrap(), 0);
        assert_eq!(tracker.sweep().await.unwrap(), 1);

        assert!(store.list_presence("match:1").await.unwrap().is_empty());
        assert!(tracker.inner.sessions.is_empty());
        assert!(tracker.inner.counts.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_guard_removes_the_viewer() {
        let (tracker, store) = tracker();
        let mut counts = tracker.subscribe_count("match:1");
        let guard = tracker.attach("match:1", "a", "Ana").await.unwrap();
        assert_eq!(*counts.borrow_and_update(), 1);

        drop(guard);
        wait_for_count(&mut counts, 0).await;
        assert!(store.list_presence("match:1").await.unwrap().is_empty());
        assert!(tracker.inner.sessions.is_empty());

        drop(counts);
        tracker.active_count("match:1").await.unwrap();
        assert!(tracker.inner.counts.is_empty());
    }

    #[tokio::test]
    async fn a_superseded_guard_leaves_the_new_room_alone() {
        let (tracker, _store) = tracker();
        let first = tracker.attach("match:1", "a", "Ana").await.unwrap();
        let _second = tracker.attach("match:2", "a", "Ana").await.unwrap();
        assert_eq!(tracker.active_count("match:1").await.unwrap(), 0);

        drop(first);
        tokio::task::yield_now().await;
        assert_eq!(tracker.active_count("match:2").await.unwrap(), 1);
        assert_eq!(tracker.inner.sessions.len(), 1);
    }

    #[tokio::test]
    async fn rejoining_over_http_keeps_the_attached_heartbeat() {
        let (tracker, _store) = tracker();
        let guard = tracker.attach("match:1", "a", "Ana").await.unwrap();
        assert_eq!(tracker.join("match:1", "a", "Ana").await.unwrap(), 1);

        let mut counts = tracker.subscribe_count("match:1");
        drop(guard);
        wait_for_count(&mut counts, 0).await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_keeps_the_record_fresh() {
        let (tracker, store) = tracker();
        let _guard = tracker.attach("match:1", "a", "Ana").await.unwrap();
        store.put_presence(stale_record("match:1", "a")).await.unwrap();
        assert_eq!(tracker.active_count("match:1").await.unwrap(), 0);

        sleep(HEARTBEAT_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(tracker.active_count("match:1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn presence_requires_a_store() {
        let tracker = PresenceTracker::new(StoreHandle::new());
        assert!(matches!(
            tracker.join("match:1", "a", "Ana").await,
            Err(ServiceError::Degraded)
        ));
        assert!(matches!(
            tracker.attach("match:1", "a", "Ana").await,
            Err(ServiceError::Degraded)
        ));
    }
}
