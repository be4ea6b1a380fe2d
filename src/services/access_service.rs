use time::OffsetDateTime;

use crate::{
    error::ServiceError,
    services::sync_service::LiveMatchSynchronizer,
    state::{
        SharedState,
        chat_access::{AccessState, ChatAccessController, ChatAccessWindow, ChatRoute, room_id_for},
        fixture::Fixture,
    },
};

/// Access decision for one fixture at one instant.
#[derive(Debug, Clone)]
pub struct FixtureAccess {
    pub fixture: Fixture,
    pub window: ChatAccessWindow,
    pub route: ChatRoute,
    pub room_id: String,
}

/// Evaluate the chat window of `fixture_id` right now.
pub async fn evaluate(state: &SharedState, fixture_id: &str) -> Result<FixtureAccess, ServiceError> {
    evaluate_at(
        state.synchronizer(),
        state.access(),
        fixture_id,
        OffsetDateTime::now_utc(),
    )
    .await
}

/// Like [`evaluate`], but fails with [`ServiceError::InvalidState`] unless the room is open.
pub async fn require_open(
    state: &SharedState,
    fixture_id: &str,
) -> Result<FixtureAccess, ServiceError> {
    ensure_open(evaluate(state, fixture_id).await?)
}

/// Access state of a fixture at `now`.
pub async fn evaluate_at(
    synchronizer: &LiveMatchSynchronizer,
    controller: &ChatAccessController,
    fixture_id: &str,
    now: OffsetDateTime,
) -> Result<FixtureAccess, ServiceError> {
    let fixture = synchronizer.fixture(fixture_id).await?;
    let window = controller.can_enable_chat(&fixture, now);
    Ok(FixtureAccess {
        room_id: room_id_for(fixture.id),
        route: window.state.into(),
        window,
        fixture,
    })
}

fn ensure_open(access: FixtureAccess) -> Result<FixtureAccess, ServiceError> {
    match access.window.state {
        AccessState::Open => Ok(access),
        AccessState::NotYetEligible => Err(ServiceError::InvalidState(format!(
            "chat for fixture {} has not opened yet",
            access.fixture.id
        ))),
        AccessState::Closed if !access.window.eligible => Err(ServiceError::InvalidState(format!(
            "fixture {} has no chat room",
            access.fixture.id
        ))),
        AccessState::Closed => Err(ServiceError::InvalidState(format!(
            "chat for fixture {} is closed",
            access.fixture.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use serde_json::{Value, json};
    use time::macros::datetime;

    use super::*;
    use crate::{
        cache::TtlCache,
        provider::{Endpoint, FixtureProvider, ProviderError},
        services::sync_service::SyncSettings,
    };

    struct OneFixture {
        league: &'static str,
        home: &'static str,
    }

    impl FixtureProvider for OneFixture {
        fn fetch(
            &self,
            endpoint: Endpoint,
            fixture_id: u64,
        ) -> BoxFuture<'static, Result<Vec<Value>, ProviderError>> {
            let items = match endpoint {
                Endpoint::Fixture => vec![json!({
                    "fixture": {
                        "id": fixture_id,
                        "date": "2026-05-02T15:00:00Z",
                        "status": { "short": "NS", "elapsed": null }
                    },
                    "league": { "id": 1000, "name": self.league },
                    "teams": {
                        "home": { "id": 1, "name": self.home },
                        "away": { "id": 2, "name": "Visitors" }
                    }
                })],
                _ => Vec::new(),
            };
            Box::pin(async move { Ok(items) })
        }
    }

    fn synchronizer(league: &'static str, home: &'static str) -> LiveMatchSynchronizer {
        let settings = SyncSettings {
            fixture_ttl: Duration::from_secs(60),
            ..SyncSettings::default()
        };
        LiveMatchSynchronizer::new(
            Arc::new(OneFixture { league, home }),
            TtlCache::in_memory("access"),
            settings,
        )
    }

    #[tokio::test]
    async fn routes_follow_the_window() {
        let sync = synchronizer("Premier League", "Arsenal");
        let controller = ChatAccessController::default();

        let early = evaluate_at(&sync, &controller, "5", datetime!(2026-05-02 14:10 UTC))
            .await
            .unwrap();
        assert_eq!(early.route, ChatRoute::Preview);
        assert_eq!(early.room_id, "match:5");

        let live = evaluate_at(&sync, &controller, "5", datetime!(2026-05-02 14:50 UTC))
            .await
            .unwrap();
        assert_eq!(live.route, ChatRoute::LiveRoom);
        assert!(ensure_open(live).is_ok());

        let late = evaluate_at(&sync, &controller, "5", datetime!(2026-05-02 17:30 UTC))
            .await
            .unwrap();
        assert_eq!(late.route, ChatRoute::Summary);
        assert!(matches!(ensure_open(late), Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn ineligible_fixture_never_opens() {
        let sync = synchronizer("Ligue 1", "Lens");
        let controller = ChatAccessController::default();

        let access = evaluate_at(&sync, &controller, "8", datetime!(2026-05-02 15:10 UTC))
            .await
            .unwrap();
        assert!(!access.window.eligible);
        assert_eq!(access.window.state, AccessState::Closed);
        assert!(ensure_open(access).is_err());
    }

    #[tokio::test]
    async fn bad_fixture_id_is_invalid_input() {
        let sync = synchronizer("Premier League", "Arsenal");
        let result = evaluate_at(
            &sync,
            &ChatAccessController::default(),
            "nope",
            datetime!(2026-05-02 15:00 UTC),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
