use std::time::{Duration, SystemTime};

use futures::{future::BoxFuture, stream::BoxStream};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::{
    chat_store::{ChatStore, ToggleOutcome, WELCOME_MESSAGE_ID, sort_messages},
    models::{ChatMessageEntity, MessageDraft, MessageKindEntity, PresenceEntity},
    storage::{StorageError, StorageResult},
};

use super::{
    client::{CouchClient, WriteOutcome},
    models::{
        CouchMessageDocument, CouchPresenceDocument, message_doc_id, message_room_prefix,
        presence_doc_id, presence_room_prefix,
    },
};

/// Compare-and-swap attempts before a contended write is reported.
const MAX_WRITE_ATTEMPTS: u32 = 8;
/// Pause before re-opening a failed `_changes` long-poll.
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// [`ChatStore`] backed by CouchDB documents. Every read-modify-write carries
/// the document revision so concurrent writers never overwrite each other.
#[derive(Clone)]
pub struct CouchChatStore {
    couch: CouchClient,
}

impl CouchChatStore {
    /// Wrap an already connected client.
    pub fn new(couch: CouchClient) -> Self {
        Self { couch }
    }
}

impl ChatStore for CouchChatStore {
    fn append_message(
        &self,
        draft: MessageDraft,
    ) -> BoxFuture<'static, StorageResult<ChatMessageEntity>> {
        let store = self.clone();
        Box::pin(async move {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let message = draft.clone().into_entity(Uuid::new_v4(), SystemTime::now());
                let doc = CouchMessageDocument::from(message);
                match store.couch.put_document(&doc.id, &doc).await? {
                    WriteOutcome::Written => return Ok(doc.message),
                    // Only a v4 collision can conflict on a fresh id; draw again.
                    WriteOutcome::Conflict => continue,
                }
            }
            Err(StorageError::Contention {
                key: message_room_prefix(&draft.room_id),
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }

    fn ensure_welcome(&self, draft: MessageDraft) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchMessageDocument::from(
                draft.into_entity(WELCOME_MESSAGE_ID, SystemTime::now()),
            );
            // Writing without a revision fails with 409 when the welcome exists.
            match store.couch.put_document(&doc.id, &doc).await? {
                WriteOutcome::Written => Ok(true),
                WriteOutcome::Conflict => Ok(false),
            }
        })
    }

    fn find_message(
        &self,
        room_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ChatMessageEntity>>> {
        let store = self.clone();
        let doc_id = message_doc_id(room_id, id);
        Box::pin(async move {
            let doc = store
                .couch
                .get_document::<CouchMessageDocument>(&doc_id)
                .await?;
            Ok(doc.map(|doc| doc.message))
        })
    }

    fn list_messages(
        &self,
        room_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        let prefix = message_room_prefix(room_id);
        Box::pin(async move {
            let docs = store
                .couch
                .list_documents::<CouchMessageDocument>(&prefix)
                .await?;
            let mut messages: Vec<_> = docs.into_iter().map(|doc| doc.message).collect();
            sort_messages(&mut messages);
            Ok(messages)
        })
    }

    fn toggle_reaction(
        &self,
        room_id: &str,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<ToggleOutcome>> {
        let store = self.clone();
        let doc_id = message_doc_id(room_id, message_id);
        let emoji = emoji.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            for attempt in 1..=MAX_WRITE_ATTEMPTS {
                let Some(mut doc) = store
                    .couch
                    .get_document::<CouchMessageDocument>(&doc_id)
                    .await?
                else {
                    return Ok(ToggleOutcome::MessageNotFound);
                };

                if doc.message.kind == MessageKindEntity::System {
                    return Ok(ToggleOutcome::SystemMessage);
                }

                doc.message.toggle_reaction(&emoji, &user_id);
                match store.couch.put_document(&doc_id, &doc).await? {
                    WriteOutcome::Written => return Ok(ToggleOutcome::Applied(doc.message)),
                    WriteOutcome::Conflict => {
                        debug!(doc_id = %doc_id, attempt, "reaction toggle lost a revision race; retrying");
                    }
                }
            }

            Err(StorageError::Contention {
                key: doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }

    fn put_presence(&self, presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = presence_doc_id(&presence.room_id, &presence.user_id);
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let rev = store.couch.get_revision(&doc_id).await?;
                let doc = CouchPresenceDocument::from((presence.clone(), rev));
                if store.couch.put_document(&doc_id, &doc).await? == WriteOutcome::Written {
                    return Ok(());
                }
            }
            Err(StorageError::Contention {
                key: doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }

    fn delete_presence(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = presence_doc_id(room_id, user_id);
        Box::pin(async move {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let Some(rev) = store.couch.get_revision(&doc_id).await? else {
                    return Ok(());
                };
                if store.couch.delete_document(&doc_id, &rev).await? == WriteOutcome::Written {
                    return Ok(());
                }
            }
            Err(StorageError::Contention {
                key: doc_id,
                attempts: MAX_WRITE_ATTEMPTS,
            })
        })
    }

    fn list_presence(
        &self,
        room_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<PresenceEntity>>> {
        let store = self.clone();
        let prefix = presence_room_prefix(room_id);
        Box::pin(async move {
            let docs = store
                .couch
                .list_documents::<CouchPresenceDocument>(&prefix)
                .await?;
            Ok(docs.into_iter().map(|doc| doc.presence).collect())
        })
    }

    fn watch_room(&self, room_id: &str) -> BoxStream<'static, StorageResult<()>> {
        let couch = self.couch.clone();
        // Presence documents carry `room_id` too; only messages have `kind`.
        let selector = json!({ "room_id": room_id, "kind": { "$exists": true } });
        Box::pin(async_stream::stream! {
            let mut since = Value::String("now".into());
            loop {
                match couch.wait_for_changes(&selector, &since).await {
                    Ok((count, last_seq)) => {
                        since = last_seq;
                        if count > 0 {
                            yield Ok(());
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "room change feed failed; retrying");
                        yield Err(StorageError::from(err));
                        sleep(WATCH_RETRY_DELAY).await;
                    }
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.couch.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.couch.ensure_database().await.map_err(Into::into) })
    }
}
