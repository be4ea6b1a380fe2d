//! Typed fixture data produced by the provider adapters.

use std::{sync::Arc, time::SystemTime};

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Lifecycle of a fixture, collapsed from the provider's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    NotStarted,
    FirstHalf,
    Halftime,
    SecondHalf,
    ExtraTime,
    Finished,
}

impl FixtureStatus {
    /// Map a provider short status code. Ambiguous live codes are resolved
    /// with the elapsed minute; unknown codes count as not started.
    pub fn from_short_code(code: &str, elapsed: Option<u16>) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "1H" => Self::FirstHalf,
            "HT" => Self::Halftime,
            "2H" => Self::SecondHalf,
            "ET" | "BT" | "P" => Self::ExtraTime,
            "FT" | "AET" | "PEN" | "CANC" | "ABD" | "AWD" | "WO" => Self::Finished,
            "LIVE" | "SUSP" | "INT" => match elapsed {
                Some(minute) if minute > 45 => Self::SecondHalf,
                _ => Self::FirstHalf,
            },
            _ => Self::NotStarted,
        }
    }

    /// Whether the fixture is in an active period and should keep being polled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::FirstHalf | Self::Halftime | Self::SecondHalf | Self::ExtraTime
        )
    }
}

/// Team reference as carried by fixtures and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TeamRef {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Competition a fixture belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct League {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Home/away tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Score {
    pub home: u16,
    pub away: u16,
}

/// Scheduled or running match as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub id: u64,
    pub home: TeamRef,
    pub away: TeamRef,
    pub league: League,
    pub kickoff: OffsetDateTime,
    pub status: FixtureStatus,
    pub elapsed: Option<u16>,
    pub goals: Score,
    pub venue: Option<String>,
}

impl Fixture {
    /// Minute shown next to chat messages: the elapsed clock while the ball is
    /// in play, 45 at the break, nothing before kickoff or after the final whistle.
    pub fn match_minute(&self) -> Option<u16> {
        match self.status {
            FixtureStatus::FirstHalf | FixtureStatus::SecondHalf | FixtureStatus::ExtraTime => {
                self.elapsed
            }
            FixtureStatus::Halftime => Some(45),
            FixtureStatus::NotStarted | FixtureStatus::Finished => None,
        }
    }
}

/// Provider event before classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMatchEvent {
    pub provider_id: Option<String>,
    pub minute: u16,
    pub extra: Option<u16>,
    pub event_type: String,
    pub detail: String,
    pub comments: Option<String>,
    pub team_id: Option<u64>,
    pub player: Option<String>,
    pub assist: Option<String>,
}

/// Value of one statistics row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatValue {
    Count { value: u32 },
    Percent { value: u8 },
    Text { value: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatEntry {
    pub name: String,
    pub value: StatValue,
}

/// Statistics rows of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TeamStatistics {
    pub team: TeamRef,
    pub entries: Vec<StatEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineupPlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// Starting eleven and bench of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TeamLineup {
    pub team: TeamRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach: Option<String>,
    pub starting: Vec<LineupPlayer>,
    pub substitutes: Vec<LineupPlayer>,
}

/// Closed set of timeline entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    YellowCard,
    RedCard,
    Substitution,
    Corner,
    ShotOnTarget,
    ShotOffTarget,
    BlockedShot,
    Save,
    Offside,
    Foul,
    Var,
    PeriodMarker,
    /// Anything no other rule recognised.
    Shot,
}

/// Team an event belongs to; `Neutral` when it cannot be attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Normal,
    Penalty,
    OwnGoal,
}

/// Kind-specific payload of a [`ClassifiedEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetails {
    Goal {
        scorer: Option<String>,
        assist: Option<String>,
        goal_type: GoalType,
        score_after: Score,
    },
    Card {
        player: Option<String>,
        reason: Option<String>,
    },
    Substitution {
        player_on: Option<String>,
        player_off: Option<String>,
    },
    Shot {
        shooter: Option<String>,
    },
    Save {
        goalkeeper: Option<String>,
    },
    Var {
        decision: String,
    },
    Period {
        label: String,
    },
    Player {
        player: Option<String>,
    },
}

/// One entry of the typed match timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClassifiedEvent {
    pub id: String,
    pub minute: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<u16>,
    pub kind: EventKind,
    pub side: Side,
    pub title: String,
    pub description: String,
    pub details: EventDetails,
}

/// Consistent view of one fixture assembled from the four provider endpoints.
#[derive(Debug, Clone)]
pub struct MatchSnapshot {
    pub fixture: Fixture,
    pub events: Vec<ClassifiedEvent>,
    pub statistics: Vec<TeamStatistics>,
    pub lineups: Vec<TeamLineup>,
    pub fetched_at: SystemTime,
}

/// Shared handle to a published snapshot.
pub type SharedSnapshot = Arc<MatchSnapshot>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_onto_periods() {
        assert_eq!(FixtureStatus::from_short_code("NS", None), FixtureStatus::NotStarted);
        assert_eq!(FixtureStatus::from_short_code("1h", Some(12)), FixtureStatus::FirstHalf);
        assert_eq!(FixtureStatus::from_short_code("HT", Some(45)), FixtureStatus::Halftime);
        assert_eq!(FixtureStatus::from_short_code("BT", Some(90)), FixtureStatus::ExtraTime);
        assert_eq!(FixtureStatus::from_short_code("AET", Some(120)), FixtureStatus::Finished);
        assert_eq!(FixtureStatus::from_short_code("LIVE", Some(30)), FixtureStatus::FirstHalf);
        assert_eq!(FixtureStatus::from_short_code("SUSP", Some(70)), FixtureStatus::SecondHalf);
        assert_eq!(FixtureStatus::from_short_code("???", Some(70)), FixtureStatus::NotStarted);
    }

    #[test]
    fn halftime_counts_as_active() {
        assert!(FixtureStatus::Halftime.is_active());
        assert!(!FixtureStatus::NotStarted.is_active());
        assert!(!FixtureStatus::Finished.is_active());
    }
}
