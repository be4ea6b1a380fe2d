//! In-process [`ChatStore`] used when no CouchDB is configured and by tests.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use futures::{
    StreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{ChatStore, ToggleOutcome, WELCOME_MESSAGE_ID, sort_messages};
use crate::dao::{
    models::{ChatMessageEntity, MessageDraft, MessageKindEntity, PresenceEntity},
    storage::StorageResult,
};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Store keeping every room in memory. Per-room mutations run under the
/// room's map shard lock, which makes each toggle atomic.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rooms: DashMap<String, Vec<ChatMessageEntity>>,
    presence: DashMap<(String, String), PresenceEntity>,
    changes: DashMap<String, broadcast::Sender<()>>,
}

impl Inner {
    fn notify(&self, room_id: &str) {
        if let Some(sender) = self.changes.get(room_id) {
            let _ = sender.send(());
        }
    }

    fn append(&self, draft: MessageDraft, id: Uuid) -> ChatMessageEntity {
        let room_id = draft.room_id.clone();
        let message = {
            let mut room = self.rooms.entry(room_id.clone()).or_default();
            // Keep send order and timestamp order identical within a room.
            let now = SystemTime::now();
            let sent_at = match room.last() {
                Some(last) if last.sent_at >= now => last.sent_at + Duration::from_micros(1),
                _ => now,
            };
            let message = draft.into_entity(id, sent_at);
            room.push(message.clone());
            message
        };
        self.notify(&room_id);
        message
    }
}

impl MemoryChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for MemoryChatStore {
    fn append_message(
        &self,
        draft: MessageDraft,
    ) -> BoxFuture<'static, StorageResult<ChatMessageEntity>> {
        let message = self.inner.append(draft, Uuid::new_v4());
        Box::pin(future::ready(Ok(message)))
    }

    fn ensure_welcome(&self, draft: MessageDraft) -> BoxFuture<'static, StorageResult<bool>> {
        let room_id = draft.room_id.clone();
        let created = {
            let mut room = self.inner.rooms.entry(room_id.clone()).or_default();
            if room.iter().any(|message| message.id == WELCOME_MESSAGE_ID) {
                false
            } else {
                room.push(draft.into_entity(WELCOME_MESSAGE_ID, SystemTime::now()));
                sort_messages(room.as_mut_slice());
                true
            }
        };
        if created {
            self.inner.notify(&room_id);
        }
        Box::pin(future::ready(Ok(created)))
    }

    fn find_message(
        &self,
        room_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ChatMessageEntity>>> {
        let found = self
            .inner
            .rooms
            .get(room_id)
            .and_then(|room| room.iter().find(|message| message.id == id).cloned());
        Box::pin(future::ready(Ok(found)))
    }

    fn list_messages(
        &self,
        room_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let mut messages = self
            .inner
            .rooms
            .get(room_id)
            .map(|room| room.clone())
            .unwrap_or_default();
        sort_messages(&mut messages);
        Box::pin(future::ready(Ok(messages)))
    }

    fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<ToggleOutcome>> {
        let outcome = match self.inner.rooms.get_mut(room_id) {
            None => ToggleOutcome::MessageNotFound,
            Some(mut room) => match room.iter_mut().find(|message| message.id == message_id) {
                None => ToggleOutcome::MessageNotFound,
                Some(message) if message.kind == MessageKindEntity::System => {
                    ToggleOutcome::SystemMessage
                }
                Some(message) => {
                    message.toggle_reaction(emoji, user_id);
                    ToggleOutcome::Applied(message.clone())
                }
            },
        };
        if matches!(outcome, ToggleOutcome::Applied(_)) {
            self.inner.notify(room_id);
        }
        Box::pin(future::ready(Ok(outcome)))
    }

    fn put_presence(&self, presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>> {
        let key = (presence.room_id.clone(), presence.user_id.clone());
        self.inner.presence.insert(key, presence);
        Box::pin(future::ready(Ok(())))
    }

    fn delete_presence(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner
            .presence
            .remove(&(room_id.to_string(), user_id.to_string()));
        Box::pin(future::ready(Ok(())))
    }

    fn list_presence(
        &self,
        room_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PresenceEntity>>> {
        let records = self
            .inner
            .presence
            .iter()
            .filter(|entry| entry.key().0 == room_id)
            .map(|entry| entry.value().clone())
            .collect();
        Box::pin(future::ready(Ok(records)))
    }

    fn watch_room(&self, room_id: &str) -> BoxStream<'static, StorageResult<()>> {
        let receiver = self
            .inner
            .changes
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .subscribe();
        // A lagged receiver still means "something changed".
        BroadcastStream::new(receiver).map(|_| Ok(())).boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}
