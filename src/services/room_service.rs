use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    dto::{
        chat::{MessageDto, ReactionRequest, SendMessageRequest, TapRequest, TapResponse, to_message_list},
        presence::{JoinRequest, PresenceCount},
    },
    error::ServiceError,
    services::{
        access_service::{self, FixtureAccess},
        chat_service::{Author, OutgoingMessage},
    },
    state::SharedState,
};

/// Messages of a fixture's room. History stays readable after the room closes.
pub async fn list_messages(state: &SharedState, fixture_id: &str) -> Result<Vec<MessageDto>, ServiceError> {
    let access = access_service::evaluate(state, fixture_id).await?;
    let messages = state.chat().list(&access.room_id).await?;
    Ok(to_message_list(&messages))
}

/// Post a viewer message, stamped with the current match minute.
pub async fn send_message(
    state: &SharedState,
    fixture_id: &str,
    payload: SendMessageRequest,
) -> Result<MessageDto, ServiceError> {
    let access = access_service::require_open(state, fixture_id).await?;
    let message = OutgoingMessage {
        author: Author {
            id: payload.author_id,
            name: payload.author_name,
        },
        text: payload.text,
        reply_to: payload.reply_to,
        match_minute: match_minute(state, &access),
    };
    let stored = state.chat().send(&access.room_id, message).await?;
    Ok(stored.into())
}

/// Toggle an emoji reaction on a message of an open room.
pub async fn toggle_reaction(
    state: &SharedState,
    fixture_id: &str,
    message_id: Uuid,
    payload: ReactionRequest,
) -> Result<MessageDto, ServiceError> {
    let access = access_service::require_open(state, fixture_id).await?;
    let message = state
        .chat()
        .toggle_reaction(&access.room_id, message_id, &payload.emoji, &payload.user_id)
        .await?;
    Ok(message.into())
}

/// Register a tap on a message; the second quick tap toggles a heart.
pub async fn tap_message(
    state: &SharedState,
    fixture_id: &str,
    message_id: Uuid,
    payload: TapRequest,
) -> Result<TapResponse, ServiceError> {
    let access = access_service::require_open(state, fixture_id).await?;
    let toggled = state
        .chat()
        .tap(&access.room_id, &payload.client_id, message_id, Instant::now())
        .await?;
    Ok(TapResponse {
        double_tap: toggled.is_some(),
        message: toggled.map(MessageDto::from),
    })
}

/// Join an open room, or refresh the viewer's presence there.
pub async fn join(
    state: &SharedState,
    fixture_id: &str,
    payload: JoinRequest,
) -> Result<PresenceCount, ServiceError> {
    let access = access_service::require_open(state, fixture_id).await?;
    let active = state
        .presence()
        .join(&access.room_id, &payload.client_id, &payload.name)
        .await?;
    Ok(PresenceCount {
        room_id: access.room_id,
        active,
    })
}

/// Leave a room; allowed whatever the access state.
pub async fn leave(
    state: &SharedState,
    fixture_id: &str,
    client_id: &str,
) -> Result<PresenceCount, ServiceError> {
    let access = access_service::evaluate(state, fixture_id).await?;
    let active = state.presence().leave(&access.room_id, client_id).await?;
    Ok(PresenceCount {
        room_id: access.room_id,
        active,
    })
}

pub async fn presence(state: &SharedState, fixture_id: &str) -> Result<PresenceCount, ServiceError> {
    let access = access_service::evaluate(state, fixture_id).await?;
    let active = state.presence().active_count(&access.room_id).await?;
    Ok(PresenceCount {
        room_id: access.room_id,
        active,
    })
}

fn match_minute(state: &SharedState, access: &FixtureAccess) -> Option<u16> {
    state
        .synchronizer()
        .current_minute(access.fixture.id)
        .or_else(|| access.fixture.match_minute())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

    use super::*;
    use crate::{
        cache::MemoryDurableCache,
        config::AppConfig,
        dao::chat_store::memory::MemoryChatStore,
        provider::{Endpoint, FixtureProvider, ProviderError},
        state::{AppState, store::StoreHandle},
    };

    /// Serves one fixture in its first half.
    struct LiveFixture {
        kickoff: OffsetDateTime,
        league: (u64, &'static str),
        teams: (&'static str, &'static str),
    }

    impl FixtureProvider for LiveFixture {
        fn fetch(
            &self,
            endpoint: Endpoint,
            fixture_id: u64,
        ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>> {
            let date = self.kickoff.format(&Rfc3339).unwrap_or_default();
            let items = match endpoint {
                Endpoint::Fixture => vec![json!({
                    "fixture": {
                        "id": fixture_id,
                        "date": date,
                        "status": { "short": "1H", "elapsed": 12 }
                    },
                    "league": { "id": self.league.0, "name": self.league.1 },
                    "teams": {
                        "home": { "id": 1, "name": self.teams.0 },
                        "away": { "id": 2, "name": self.teams.1 }
                    },
                    "goals": { "home": 0, "away": 0 }
                })],
                _ => Vec::new(),
            };
            Box::pin(async move { Ok(items) })
        }
    }

    fn app(league: (u64, &'static str), teams: (&'static str, &'static str)) -> SharedState {
        AppState::new(
            AppConfig::default(),
            Arc::new(LiveFixture {
                kickoff: OffsetDateTime::now_utc() - Duration::minutes(12),
                league,
                teams,
            }),
            Arc::new(MemoryDurableCache::new()),
            StoreHandle::with_store(Arc::new(MemoryChatStore::new())),
        )
    }

    fn message(text: &str) -> SendMessageRequest {
        SendMessageRequest {
            author_id: "u1".into(),
            author_name: "Ana".into(),
            text: text.into(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn sent_messages_carry_the_match_minute() {
        let state = app((39, "Premier League"), ("Arsenal", "Chelsea"));
        let sent = send_message(&state, "77", message("what a start")).await.unwrap();
        assert_eq!(sent.room_id, "match:77");
        assert_eq!(sent.match_minute, Some(12));

        let listed = list_messages(&state, "77").await.unwrap();
        assert!(listed.iter().any(|m| m.id == sent.id));
    }

    #[tokio::test]
    async fn second_tap_toggles_a_heart() {
        let state = app((39, "Premier League"), ("Arsenal", "Chelsea"));
        let sent = send_message(&state, "77", message("goal!")).await.unwrap();
        let tap = || TapRequest {
            client_id: "c1".into(),
        };

        let first = tap_message(&state, "77", sent.id, tap()).await.unwrap();
        assert!(!first.double_tap);
        let second = tap_message(&state, "77", sent.id, tap()).await.unwrap();
        assert!(second.double_tap);
        let hearts = second.message.unwrap().reactions;
        assert_eq!(hearts.len(), 1);
        assert_eq!(hearts[0].count, 1);
    }

    #[tokio::test]
    async fn presence_follows_joins() {
        let state = app((39, "Premier League"), ("Arsenal", "Chelsea"));
        let joined = join(
            &state,
            "77",
            JoinRequest {
                client_id: "c1".into(),
                name: "Ana".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(joined.active, 1);
        assert_eq!(presence(&state, "77").await.unwrap().active, 1);
        assert_eq!(leave(&state, "77", "c1").await.unwrap().active, 0);
    }

    #[tokio::test]
    async fn ineligible_rooms_reject_writes() {
        let state = app((61, "Ligue 1"), ("Lens", "Lille"));
        let result = send_message(&state, "77", message("hello")).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        let result = join(
            &state,
            "77",
            JoinRequest {
                client_id: "c1".into(),
                name: "Ana".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }
}
