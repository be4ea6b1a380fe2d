use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{ChatMessageEntity, MessageKindEntity},
    dto::{
        format_system_time,
        validation::{validate_emoji, validate_identifier, validate_text},
    },
    services::chat_service::MAX_MESSAGE_LENGTH,
};

const MAX_AUTHOR_NAME_LENGTH: usize = 40;

/// New message posted by a viewer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

impl Validate for SendMessageRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_identifier(&self.author_id) {
            errors.add("author_id", e);
        }
        if let Err(e) = validate_text(&self.author_name, MAX_AUTHOR_NAME_LENGTH) {
            errors.add("author_name", e);
        }
        if let Err(e) = validate_text(&self.text, MAX_MESSAGE_LENGTH) {
            errors.add("text", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Toggle of one emoji reaction by one user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionRequest {
    pub user_id: String,
    pub emoji: String,
}

impl Validate for ReactionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_identifier(&self.user_id) {
            errors.add("user_id", e);
        }
        if let Err(e) = validate_emoji(&self.emoji) {
            errors.add("emoji", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Single tap on a message; two within the window add or remove a heart.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TapRequest {
    #[validate(length(min = 1, max = 64))]
    pub client_id: String,
}

/// Outcome of a tap.
#[derive(Debug, Serialize, ToSchema)]
pub struct TapResponse {
    pub double_tap: bool,
    /// Message after the heart toggle, on a double tap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageDto>,
}

/// Viewer messages versus room announcements.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKindDto {
    User,
    System,
}

impl From<MessageKindEntity> for MessageKindDto {
    fn from(kind: MessageKindEntity) -> Self {
        match kind {
            MessageKindEntity::User => MessageKindDto::User,
            MessageKindEntity::System => MessageKindDto::System,
        }
    }
}

/// Snapshot of the message being replied to.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReplyPreviewDto {
    pub message_id: Uuid,
    pub author_name: String,
    pub text: String,
}

/// One emoji with the users who reacted with it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReactionDto {
    pub emoji: String,
    pub count: u32,
    pub reactors: Vec<String>,
}

/// Chat message as exposed over HTTP and SSE.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageDto {
    pub id: Uuid,
    pub room_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub sent_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_minute: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyPreviewDto>,
    /// Reactions in first-reaction order.
    pub reactions: Vec<ReactionDto>,
    pub kind: MessageKindDto,
}

impl From<ChatMessageEntity> for MessageDto {
    fn from(message: ChatMessageEntity) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            author_id: message.author_id,
            author_name: message.author_name,
            text: message.text,
            sent_at: format_system_time(message.sent_at),
            match_minute: message.match_minute,
            reply_to: message.reply_to.map(|reply| ReplyPreviewDto {
                message_id: reply.message_id,
                author_name: reply.author_name,
                text: reply.text,
            }),
            reactions: message
                .reactions
                .into_iter()
                .map(|(emoji, reaction)| ReactionDto {
                    emoji,
                    count: reaction.count,
                    reactors: reaction.reactors,
                })
                .collect(),
            kind: message.kind.into(),
        }
    }
}

/// Convert a full room listing for the wire.
pub fn to_message_list(messages: &[ChatMessageEntity]) -> Vec<MessageDto> {
    messages.iter().cloned().map(MessageDto::from).collect()
}
