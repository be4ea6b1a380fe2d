use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{format_datetime, format_system_time},
    services::{access_service::FixtureAccess, sync_service::SyncState},
    state::{
        chat_access::{AccessState, ChatRoute},
        fixture::{
            ClassifiedEvent, Fixture, FixtureStatus, League, MatchSnapshot, Score, TeamLineup,
            TeamRef, TeamStatistics,
        },
    },
};

/// Chat access window of a fixture.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessResponse {
    pub fixture_id: u64,
    pub room_id: String,
    pub eligible: bool,
    pub state: AccessState,
    pub route: ChatRoute,
    /// RFC 3339 instant the room opens.
    pub opens_at: String,
    /// RFC 3339 instant the room closes.
    pub closes_at: String,
}

impl From<FixtureAccess> for AccessResponse {
    fn from(access: FixtureAccess) -> Self {
        Self {
            fixture_id: access.fixture.id,
            room_id: access.room_id,
            eligible: access.window.eligible,
            state: access.window.state,
            route: access.route,
            opens_at: format_datetime(access.window.opens_at),
            closes_at: format_datetime(access.window.closes_at),
        }
    }
}

/// Teams, kickoff and status of a fixture.
#[derive(Debug, Serialize, ToSchema)]
pub struct FixtureSummary {
    pub id: u64,
    pub home: TeamRef,
    pub away: TeamRef,
    pub league: League,
    pub kickoff: String,
    pub status: FixtureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_minute: Option<u16>,
    pub goals: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

impl From<&Fixture> for FixtureSummary {
    fn from(fixture: &Fixture) -> Self {
        Self {
            id: fixture.id,
            home: fixture.home.clone(),
            away: fixture.away.clone(),
            league: fixture.league.clone(),
            kickoff: format_datetime(fixture.kickoff),
            status: fixture.status,
            elapsed: fixture.elapsed,
            match_minute: fixture.match_minute(),
            goals: fixture.goals,
            venue: fixture.venue.clone(),
        }
    }
}

/// Assembled view of a fixture.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub fixture: FixtureSummary,
    pub events: Vec<ClassifiedEvent>,
    pub statistics: Vec<TeamStatistics>,
    pub lineups: Vec<TeamLineup>,
    pub fetched_at: String,
}

impl From<&MatchSnapshot> for SnapshotResponse {
    fn from(snapshot: &MatchSnapshot) -> Self {
        Self {
            fixture: (&snapshot.fixture).into(),
            events: snapshot.events.clone(),
            statistics: snapshot.statistics.clone(),
            lineups: snapshot.lineups.clone(),
            fetched_at: format_system_time(snapshot.fetched_at),
        }
    }
}

/// Coarse state of the fixture poller as seen by clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Loading,
    Ready,
    Failed,
}

/// Payload of the `sync` SSE event.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStateEvent {
    pub phase: SyncPhase,
    /// Latest good snapshot; kept when a refresh fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&SyncState> for SyncStateEvent {
    fn from(state: &SyncState) -> Self {
        let phase = match state {
            SyncState::Loading => SyncPhase::Loading,
            SyncState::Ready(_) => SyncPhase::Ready,
            SyncState::Failed { .. } => SyncPhase::Failed,
        };
        let error = match state {
            SyncState::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        };
        Self {
            phase,
            snapshot: state.snapshot().map(|snapshot| snapshot.as_ref().into()),
            error,
        }
    }
}

/// Whether a poller runs for the fixture after a watch request.
#[derive(Debug, Serialize, ToSchema)]
pub struct WatchResponse {
    pub fixture_id: u64,
    pub polling: bool,
}
