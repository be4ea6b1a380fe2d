pub mod memory;

use futures::{future::BoxFuture, stream::BoxStream};
use uuid::Uuid;

use crate::dao::models::{ChatMessageEntity, MessageDraft, PresenceEntity};
use crate::dao::storage::StorageResult;

/// Identifier reserved for the system welcome message of every room.
pub const WELCOME_MESSAGE_ID: Uuid = Uuid::nil();

/// Result of an atomic reaction toggle applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The toggle was applied; carries the message as stored afterwards.
    Applied(ChatMessageEntity),
    /// No message with that id exists in the room.
    MessageNotFound,
    /// The target is a system message, which never accepts reactions.
    SystemMessage,
}

/// Abstraction over the shared document store backing chat rooms and presence.
///
/// Every mutation is applied atomically by the implementation; callers never
/// compute counters locally and write them back.
pub trait ChatStore: Send + Sync {
    /// Append a message, assigning its identifier and send timestamp.
    fn append_message(&self, draft: MessageDraft)
    -> BoxFuture<'static, StorageResult<ChatMessageEntity>>;
    /// Write the welcome message under [`WELCOME_MESSAGE_ID`] unless it already
    /// exists. Returns `true` when this call created it.
    fn ensure_welcome(&self, draft: MessageDraft) -> BoxFuture<'static, StorageResult<bool>>;
    /// Fetch one message of a room.
    fn find_message(
        &self,
        room_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ChatMessageEntity>>>;
    /// List every message of a room ordered by send time.
    fn list_messages(&self, room_id: &str)
    -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    /// Add or remove `user_id` from the reactors of `emoji` as one atomic
    /// read-modify-write.
    fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<ToggleOutcome>>;
    /// Create or refresh a presence record.
    fn put_presence(&self, presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a presence record; deleting a missing record is not an error.
    fn delete_presence(&self, room_id: &str, user_id: &str)
    -> BoxFuture<'static, StorageResult<()>>;
    /// List presence records of a room, stale ones included.
    fn list_presence(&self, room_id: &str)
    -> BoxFuture<'static, StorageResult<Vec<PresenceEntity>>>;
    /// Stream yielding one item per observed write to the room's messages.
    fn watch_room(&self, room_id: &str) -> BoxStream<'static, StorageResult<()>>;
    /// Verify the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Order messages by send time, falling back to the identifier for ties.
pub fn sort_messages(messages: &mut [ChatMessageEntity]) {
    messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
}
