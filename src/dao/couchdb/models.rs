use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{ChatMessageEntity, PresenceEntity};

pub const MESSAGE_PREFIX: &str = "message::";
pub const PRESENCE_PREFIX: &str = "presence::";
pub const CACHE_PREFIX: &str = "cache::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Body of a `_changes` long-poll response; only the sequence and the number
/// of results matter to watchers.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRevision {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub message: ChatMessageEntity,
}

impl From<ChatMessageEntity> for CouchMessageDocument {
    fn from(message: ChatMessageEntity) -> Self {
        Self {
            id: message_doc_id(&message.room_id, message.id),
            rev: None,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPresenceDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub presence: PresenceEntity,
}

impl From<(PresenceEntity, Option<String>)> for CouchPresenceDocument {
    fn from((presence, rev): (PresenceEntity, Option<String>)) -> Self {
        Self {
            id: presence_doc_id(&presence.room_id, &presence.user_id),
            rev,
            presence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCacheDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub value: String,
}

pub fn message_room_prefix(room_id: &str) -> String {
    format!("{}{}::", MESSAGE_PREFIX, room_id)
}

pub fn message_doc_id(room_id: &str, id: Uuid) -> String {
    format!("{}{}", message_room_prefix(room_id), id)
}

pub fn presence_room_prefix(room_id: &str) -> String {
    format!("{}{}::", PRESENCE_PREFIX, room_id)
}

pub fn presence_doc_id(room_id: &str, user_id: &str) -> String {
    format!("{}{}", presence_room_prefix(room_id), user_id)
}

pub fn cache_doc_id(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
}

/// Render a `last_seq` value back into the `since` query parameter.
pub fn since_param(seq: &Value) -> String {
    match seq {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}
