use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a message was written by a viewer or generated by the room itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKindEntity {
    /// Written by a viewer through `send`.
    User,
    /// Generated by the engine (welcome message).
    System,
}

/// Denormalized snapshot of the message being replied to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyRefEntity {
    /// Identifier of the target message.
    pub message_id: Uuid,
    /// Author name of the target at reply time.
    pub author_name: String,
    /// Text of the target at reply time.
    pub text: String,
}

/// Reactors for a single emoji. `count` always mirrors `reactors.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionEntity {
    /// Number of distinct reactors.
    pub count: u32,
    /// User ids that reacted, in reaction order.
    pub reactors: Vec<String>,
}

/// Chat message persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    /// Store-assigned identifier, unique within a room.
    pub id: Uuid,
    /// Room key (`match:<fixtureId>`).
    pub room_id: String,
    /// Opaque author id.
    pub author_id: String,
    /// Author display name at send time.
    pub author_name: String,
    /// Message body.
    pub text: String,
    /// Store-assigned send timestamp.
    pub sent_at: SystemTime,
    /// Match minute at send time, if the fixture was in play.
    pub match_minute: Option<u16>,
    /// Reply preview, if this message answers another one.
    pub reply_to: Option<ReplyRefEntity>,
    /// Emoji reactions keyed by emoji, in first-reaction order.
    #[serde(default)]
    pub reactions: IndexMap<String, ReactionEntity>,
    /// Message origin.
    pub kind: MessageKindEntity,
}

/// Fields supplied by the engine when appending a message; the store fills in
/// the identifier and the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Room key (`match:<fixtureId>`).
    pub room_id: String,
    /// Opaque author id.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Message body.
    pub text: String,
    /// Match minute at send time.
    pub match_minute: Option<u16>,
    /// Reply preview.
    pub reply_to: Option<ReplyRefEntity>,
    /// Message origin.
    pub kind: MessageKindEntity,
}

impl MessageDraft {
    /// Materialize the draft with the identity chosen by the store.
    pub fn into_entity(self, id: Uuid, sent_at: SystemTime) -> ChatMessageEntity {
        ChatMessageEntity {
            id,
            room_id: self.room_id,
            author_id: self.author_id,
            author_name: self.author_name,
            text: self.text,
            sent_at,
            match_minute: self.match_minute,
            reply_to: self.reply_to,
            reactions: IndexMap::new(),
            kind: self.kind,
        }
    }
}

/// Presence record for one viewer attached to one room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEntity {
    /// Room key.
    pub room_id: String,
    /// Client/user identifier.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// When the viewer joined.
    pub joined_at: SystemTime,
    /// Last heartbeat.
    pub last_seen: SystemTime,
}

impl ChatMessageEntity {
    /// Flip `user_id` in the reactor set of `emoji`, keeping `count` in sync and
    /// dropping the key once nobody reacts with it anymore.
    ///
    /// Returns `true` when the reaction was added, `false` when it was removed.
    pub fn toggle_reaction(&mut self, emoji: &str, user_id: &str) -> bool {
        let entry = self.reactions.entry(emoji.to_string()).or_default();
        let added = match entry.reactors.iter().position(|id| id == user_id) {
            Some(index) => {
                entry.reactors.remove(index);
                false
            }
            None => {
                entry.reactors.push(user_id.to_string());
                true
            }
        };
        entry.count = entry.reactors.len() as u32;

        if entry.count == 0 {
            self.reactions.shift_remove(emoji);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ChatMessageEntity {
        MessageDraft {
            room_id: "match:1".into(),
            author_id: "u1".into(),
            author_name: "Ana".into(),
            text: "what a save".into(),
            match_minute: Some(12),
            reply_to: None,
            kind: MessageKindEntity::User,
        }
        .into_entity(Uuid::new_v4(), SystemTime::now())
    }

    #[test]
    fn toggle_twice_restores_original_state() {
        let mut msg = message();
        let original = msg.clone();

        assert!(msg.toggle_reaction("🔥", "u2"));
        assert_eq!(msg.reactions["🔥"].count, 1);
        assert!(!msg.toggle_reaction("🔥", "u2"));

        assert_eq!(msg, original);
        assert!(!msg.reactions.contains_key("🔥"));
    }

    #[test]
    fn count_tracks_distinct_reactors() {
        let mut msg = message();
        msg.toggle_reaction("👏", "a");
        msg.toggle_reaction("👏", "b");
        msg.toggle_reaction("👏", "c");
        msg.toggle_reaction("👏", "b");

        let reaction = &msg.reactions["👏"];
        assert_eq!(reaction.count, 2);
        assert_eq!(reaction.reactors, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn removing_one_emoji_keeps_order_of_the_others() {
        let mut msg = message();
        msg.toggle_reaction("1", "a");
        msg.toggle_reaction("2", "a");
        msg.toggle_reaction("3", "a");
        msg.toggle_reaction("2", "a");

        let keys: Vec<_> = msg.reactions.keys().cloned().collect();
        assert_eq!(keys, vec!["1".to_string(), "3".to_string()]);
    }
}
