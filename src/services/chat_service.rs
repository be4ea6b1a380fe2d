use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::StreamExt;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        chat_store::{ChatStore, ToggleOutcome},
        models::{ChatMessageEntity, MessageDraft, MessageKindEntity, ReplyRefEntity},
    },
    error::ServiceError,
    state::{
        optimistic::LocalRoomView,
        store::StoreHandle,
        taps::{HEART, TapDebouncer, TapOutcome},
    },
};

pub const MAX_MESSAGE_LENGTH: usize = 500;
const REPLY_SNIPPET_LENGTH: usize = 120;
const SYSTEM_AUTHOR_ID: &str = "system";
const SYSTEM_AUTHOR_NAME: &str = "Match Companion";
const WELCOME_TEXT: &str =
    "Welcome to the match chat! Keep it friendly and enjoy the game together.";

/// Full, timestamp-ordered message list of one room.
pub type RoomMessages = Arc<Vec<ChatMessageEntity>>;

/// Identity attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
}

/// Message about to be sent by a viewer.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub author: Author,
    pub text: String,
    pub reply_to: Option<Uuid>,
    pub match_minute: Option<u16>,
}

struct RoomFeed {
    sender: watch::Sender<RoomMessages>,
    subscribers: usize,
    task: JoinHandle<()>,
}

struct Inner {
    store: StoreHandle,
    rooms: DashMap<String, RoomFeed>,
    taps: TapDebouncer,
}

/// Chat rooms on top of the shared store: subscriptions, sends and reactions.
#[derive(Clone)]
pub struct ChatRoomEngine {
    inner: Arc<Inner>,
}

impl ChatRoomEngine {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                rooms: DashMap::new(),
                taps: TapDebouncer::default(),
            }),
        }
    }

    /// Number of rooms with at least one live subscription.
    pub fn active_rooms(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Current message list of a room without subscribing.
    pub async fn list(&self, room_id: &str) -> Result<Vec<ChatMessageEntity>, ServiceError> {
        let store = self.inner.store.require().await?;
        Ok(store.list_messages(room_id).await?)
    }

    /// Attach to a room. A brand-new room is seeded with its welcome message
    /// first; the subscription then yields the whole list on every change.
    pub async fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, ServiceError> {
        let store = self.inner.store.require().await?;
        if store.ensure_welcome(welcome_draft(room_id)).await? {
            info!(room_id, "room opened with welcome message");
        }
        let messages = Arc::new(store.list_messages(room_id).await?);

        let receiver = match self.inner.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let feed = entry.get_mut();
                feed.subscribers += 1;
                feed.sender.subscribe()
            }
            Entry::Vacant(entry) => {
                let (sender, receiver) = watch::channel(messages);
                let task = tokio::spawn(run_feed(store, room_id.to_string(), sender.clone()));
                entry.insert(RoomFeed {
                    sender,
                    subscribers: 1,
                    task,
                });
                debug!(room_id, "room feed started");
                receiver
            }
        };

        Ok(RoomSubscription {
            receiver,
            _guard: RoomGuard {
                engine: self.clone(),
                room_id: room_id.to_string(),
            },
        })
    }

    fn release(&self, room_id: &str) {
        let removed = self.inner.rooms.remove_if_mut(room_id, |_, feed| {
            feed.subscribers = feed.subscribers.saturating_sub(1);
            feed.subscribers == 0
        });
        if let Some((_, feed)) = removed {
            feed.task.abort();
            debug!(room_id, "room feed stopped");
        }
    }

    /// Append a viewer message. This is the only way user messages enter a room.
    pub async fn send(
        &self,
        room_id: &str,
        message: OutgoingMessage,
    ) -> Result<ChatMessageEntity, ServiceError> {
        let text = message.text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput("message text is empty".into()));
        }
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ServiceError::InvalidInput(format!(
                "message text exceeds {MAX_MESSAGE_LENGTH} characters"
            )));
        }
        let author_name = message.author.name.trim();
        if author_name.is_empty() {
            return Err(ServiceError::InvalidInput("author name is empty".into()));
        }

        let store = self.inner.store.require().await?;
        let reply_to = match message.reply_to {
            Some(target_id) => Some(reply_ref(store.as_ref(), room_id, target_id).await?),
            None => None,
        };
        // A room can be written to before anyone subscribes; the welcome still goes first.
        if store.ensure_welcome(welcome_draft(room_id)).await? {
            info!(room_id, "room opened with welcome message");
        }

        let stored = store
            .append_message(MessageDraft {
                room_id: room_id.to_string(),
                author_id: message.author.id,
                author_name: author_name.to_string(),
                text: text.to_string(),
                match_minute: message.match_minute,
                reply_to,
                kind: MessageKindEntity::User,
            })
            .await?;
        debug!(room_id, message_id = %stored.id, "message appended");
        Ok(stored)
    }

    /// Add or remove the user's `emoji` reaction as one atomic store update.
    pub async fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> Result<ChatMessageEntity, ServiceError> {
        if emoji.trim().is_empty() {
            return Err(ServiceError::InvalidInput("emoji is empty".into()));
        }
        let store = self.inner.store.require().await?;
        match store
            .toggle_reaction(room_id, message_id, emoji, user_id)
            .await?
        {
            ToggleOutcome::Applied(message) => Ok(message),
            ToggleOutcome::MessageNotFound => Err(ServiceError::NotFound(format!(
                "message `{message_id}` not found in `{room_id}`"
            ))),
            ToggleOutcome::SystemMessage => Err(ServiceError::InvalidState(
                "system messages do not accept reactions".into(),
            )),
        }
    }

    /// Register a tap; the second tap inside the window toggles a heart.
    pub async fn tap(
        &self,
        room_id: &str,
        client_id: &str,
        message_id: Uuid,
        at: Instant,
    ) -> Result<Option<ChatMessageEntity>, ServiceError> {
        match self.inner.taps.register(client_id, message_id, at) {
            TapOutcome::Single => Ok(None),
            TapOutcome::Double => self
                .toggle_reaction(room_id, message_id, HEART, client_id)
                .await
                .map(Some),
        }
    }

    /// Toggle through a local view: applied provisionally, then reconciled
    /// with the store result or rolled back.
    pub async fn toggle_reaction_optimistic(
        &self,
        view: &Mutex<LocalRoomView>,
        room_id: &str,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> Result<ChatMessageEntity, ServiceError> {
        let ticket = view.lock().await.begin_toggle(message_id, emoji);
        let result = self
            .toggle_reaction(room_id, message_id, emoji, user_id)
            .await;

        if let Some(ticket) = ticket {
            let mut view = view.lock().await;
            match &result {
                Ok(message) => view.confirm_toggle(ticket, message.clone()),
                Err(_) => view.rollback_toggle(ticket),
            }
        }
        result
    }

    /// Send through a local view; a failed send stays listed as failed.
    pub async fn send_optimistic(
        &self,
        view: &Mutex<LocalRoomView>,
        room_id: &str,
        message: OutgoingMessage,
    ) -> Result<ChatMessageEntity, ServiceError> {
        let local_id = view
            .lock()
            .await
            .begin_send(message.text.clone(), message.reply_to);
        self.deliver(view, room_id, local_id, message).await
    }

    /// Retry a failed send. Returns `Ok(None)` when nothing failed under `local_id`.
    pub async fn retry_optimistic(
        &self,
        view: &Mutex<LocalRoomView>,
        room_id: &str,
        local_id: Uuid,
        author: Author,
        match_minute: Option<u16>,
    ) -> Result<Option<ChatMessageEntity>, ServiceError> {
        let Some(pending) = view.lock().await.retry_send(local_id) else {
            return Ok(None);
        };
        let message = OutgoingMessage {
            author,
            text: pending.text,
            reply_to: pending.reply_to,
            match_minute,
        };
        self.deliver(view, room_id, local_id, message).await.map(Some)
    }

    async fn deliver(
        &self,
        view: &Mutex<LocalRoomView>,
        room_id: &str,
        local_id: Uuid,
        message: OutgoingMessage,
    ) -> Result<ChatMessageEntity, ServiceError> {
        let result = self.send(room_id, message).await;
        let mut view = view.lock().await;
        match &result {
            Ok(stored) => view.confirm_send(local_id, stored.clone()),
            Err(err) => {
                warn!(room_id, %local_id, error = %err, "message send failed");
                view.fail_send(local_id);
            }
        }
        result
    }
}

fn welcome_draft(room_id: &str) -> MessageDraft {
    MessageDraft {
        room_id: room_id.to_string(),
        author_id: SYSTEM_AUTHOR_ID.into(),
        author_name: SYSTEM_AUTHOR_NAME.into(),
        text: WELCOME_TEXT.into(),
        match_minute: None,
        reply_to: None,
        kind: MessageKindEntity::System,
    }
}

async fn reply_ref(
    store: &dyn ChatStore,
    room_id: &str,
    target_id: Uuid,
) -> Result<ReplyRefEntity, ServiceError> {
    let target = store
        .find_message(room_id, target_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("reply target `{target_id}` not found")))?;
    Ok(ReplyRefEntity {
        message_id: target.id,
        author_name: target.author_name,
        text: snippet(&target.text),
    })
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= REPLY_SNIPPET_LENGTH {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(REPLY_SNIPPET_LENGTH).collect();
    cut.push('…');
    cut
}

async fn run_feed(store: Arc<dyn ChatStore>, room_id: String, sender: watch::Sender<RoomMessages>) {
    let mut changes = store.watch_room(&room_id);
    // Writes between the initial list and the feed start would be missed otherwise.
    publish(store.as_ref(), &room_id, &sender).await;

    while let Some(change) = changes.next().await {
        match change {
            Ok(()) => publish(store.as_ref(), &room_id, &sender).await,
            Err(err) => warn!(room_id, error = %err, "room change feed interrupted"),
        }
    }
    debug!(room_id, "room change feed ended");
}

async fn publish(store: &dyn ChatStore, room_id: &str, sender: &watch::Sender<RoomMessages>) {
    match store.list_messages(room_id).await {
        Ok(messages) => {
            sender.send_if_modified(|current| {
                if current.as_slice() == messages.as_slice() {
                    false
                } else {
                    *current = Arc::new(messages);
                    true
                }
            });
        }
        Err(err) => warn!(room_id, error = %err, "failed to reload room messages"),
    }
}

/// Live view on a room. Dropping it (or calling [`RoomSubscription::unsubscribe`])
/// detaches; the room feed stops with its last subscriber.
pub struct RoomSubscription {
    receiver: watch::Receiver<RoomMessages>,
    _guard: RoomGuard,
}

impl RoomSubscription {
    /// Latest list.
    pub fn current(&self) -> RoomMessages {
        self.receiver.borrow().clone()
    }

    /// Wait for the next list; `None` once the feed is gone.
    pub async fn changed(&mut self) -> Option<RoomMessages> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Leave the room explicitly; dropping the subscription does the same.
    pub fn unsubscribe(self) {}
}

struct RoomGuard {
    engine: ChatRoomEngine,
    room_id: String,
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        self.engine.release(&self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::dao::chat_store::{WELCOME_MESSAGE_ID, memory::MemoryChatStore};

    const ROOM: &str = "match:1035";

    fn engine() -> ChatRoomEngine {
        ChatRoomEngine::new(StoreHandle::with_store(Arc::new(MemoryChatStore::new())))
    }

    fn outgoing(text: &str) -> OutgoingMessage {
        OutgoingMessage {
            author: Author {
                id: "u1".into(),
                name: "Ana".into(),
            },
            text: text.into(),
            reply_to: None,
            match_minute: Some(12),
        }
    }

    #[tokio::test]
    async fn concurrent_first_subscribers_see_one_welcome() {
        let engine = engine();
        let (a, b) = tokio::join!(engine.subscribe(ROOM), engine.subscribe(ROOM));
        let (a, b) = (a.unwrap(), b.unwrap());

        let messages = engine.list(ROOM).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, WELCOME_MESSAGE_ID);
        assert_eq!(messages[0].kind, MessageKindEntity::System);
        assert_eq!(a.current().len(), 1);
        assert_eq!(b.current().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_the_full_list_after_a_send() {
        let engine = engine();
        let mut subscription = engine.subscribe(ROOM).await.unwrap();
        engine.send(ROOM, outgoing("come on!")).await.unwrap();

        let messages = loop {
            let messages = timeout(Duration::from_secs(1), subscription.changed())
                .await
                .unwrap()
                .unwrap();
            if messages.len() == 2 {
                break messages;
            }
        };
        assert_eq!(messages[1].text, "come on!");
        assert_eq!(messages[1].match_minute, Some(12));
    }

    #[tokio::test]
    async fn sending_before_anyone_subscribes_keeps_the_welcome_first() {
        let engine = engine();
        engine.send(ROOM, outgoing("first!")).await.unwrap();

        let subscription = engine.subscribe(ROOM).await.unwrap();
        let messages = subscription.current();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, WELCOME_MESSAGE_ID);
        assert_eq!(messages[0].kind, MessageKindEntity::System);
        assert_eq!(messages[1].text, "first!");
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let engine = engine();
        for text in ["", "   ", "\n\t"] {
            assert!(matches!(
                engine.send(ROOM, outgoing(text)).await,
                Err(ServiceError::InvalidInput(_))
            ));
        }
        let long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            engine.send(ROOM, outgoing(&long)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(engine.list(ROOM).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replies_carry_a_snapshot_of_their_target() {
        let engine = engine();
        let target = engine.send(ROOM, outgoing("what a strike")).await.unwrap();

        let mut reply = outgoing("agreed");
        reply.reply_to = Some(target.id);
        let stored = engine.send(ROOM, reply).await.unwrap();

        let preview = stored.reply_to.unwrap();
        assert_eq!(preview.message_id, target.id);
        assert_eq!(preview.author_name, "Ana");
        assert_eq!(preview.text, "what a strike");

        let mut dangling = outgoing("hm?");
        dangling.reply_to = Some(Uuid::new_v4());
        assert!(matches!(
            engine.send(ROOM, dangling).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn toggles_are_idempotent_and_guarded() {
        let engine = engine();
        let _subscription = engine.subscribe(ROOM).await.unwrap();
        let message = engine.send(ROOM, outgoing("goal!")).await.unwrap();

        let once = engine
            .toggle_reaction(ROOM, message.id, "🔥", "u2")
            .await
            .unwrap();
        assert_eq!(once.reactions["🔥"].count, 1);
        let twice = engine
            .toggle_reaction(ROOM, message.id, "🔥", "u2")
            .await
            .unwrap();
        assert!(twice.reactions.is_empty());

        assert!(matches!(
            engine
                .toggle_reaction(ROOM, WELCOME_MESSAGE_ID, "🔥", "u2")
                .await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            engine.toggle_reaction(ROOM, Uuid::new_v4(), "🔥", "u2").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn double_tap_toggles_a_heart() {
        let engine = engine();
        let message = engine.send(ROOM, outgoing("save!")).await.unwrap();
        let start = Instant::now();

        assert!(engine.tap(ROOM, "c1", message.id, start).await.unwrap().is_none());
        let hearted = engine
            .tap(ROOM, "c1", message.id, start + Duration::from_millis(120))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hearted.reactions[HEART].reactors, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn degraded_engine_refuses_work() {
        let engine = ChatRoomEngine::new(StoreHandle::new());
        assert!(matches!(
            engine.subscribe(ROOM).await,
            Err(ServiceError::Degraded)
        ));
        assert!(matches!(
            engine.send(ROOM, outgoing("hi")).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn last_unsubscribe_stops_the_feed() {
        let engine = engine();
        let first = engine.subscribe(ROOM).await.unwrap();
        let second = engine.subscribe(ROOM).await.unwrap();
        assert_eq!(engine.active_rooms(), 1);

        first.unsubscribe();
        assert_eq!(engine.active_rooms(), 1);
        drop(second);
        assert_eq!(engine.active_rooms(), 0);
    }

    #[tokio::test]
    async fn rejected_optimistic_toggle_rolls_back() {
        let engine = engine();
        let message = engine.send("match:other", outgoing("elsewhere")).await.unwrap();
        let view = Mutex::new(LocalRoomView::new("u2"));
        view.lock().await.replace_confirmed(vec![message.clone()]);

        let result = engine
            .toggle_reaction_optimistic(&view, ROOM, message.id, "👏", "u2")
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(view.lock().await.messages()[0].reactions.is_empty());
    }

    #[tokio::test]
    async fn failed_optimistic_send_is_kept_and_can_be_retried() {
        let handle = StoreHandle::new();
        let engine = ChatRoomEngine::new(handle.clone());
        let view = Mutex::new(LocalRoomView::new("u1"));

        assert!(engine.send_optimistic(&view, ROOM, outgoing("hello")).await.is_err());
        let local_id = {
            let view = view.lock().await;
            let pending = view.pending_sends();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].state, crate::state::optimistic::DeliveryState::Failed);
            pending[0].local_id
        };

        handle.install(Arc::new(MemoryChatStore::new())).await;
        let author = outgoing("").author;
        let stored = engine
            .retry_optimistic(&view, ROOM, local_id, author, None)
            .await
            .unwrap()
            .unwrap();

        let view = view.lock().await;
        assert!(view.pending_sends().is_empty());
        assert_eq!(view.messages()[0].id, stored.id);
    }
}
