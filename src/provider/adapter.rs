//! One adapter per endpoint: untyped `response` items in, validated domain
//! values out. Nothing downstream looks at provider JSON.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use super::{
    Endpoint,
    raw::{RawEvent, RawFixtureItem, RawLineup, RawLineupSlot, RawPerson, RawTeam, RawTeamStatistics},
};
use crate::state::fixture::{
    Fixture, FixtureStatus, League, LineupPlayer, RawMatchEvent, Score, StatEntry, StatValue,
    TeamLineup, TeamRef, TeamStatistics,
};

/// Provider payloads that cannot be turned into domain values.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed `{endpoint}` item")]
    Malformed {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
    #[error("fixture {fixture_id} has no usable kickoff time")]
    MissingKickoff { fixture_id: u64 },
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, item: Value) -> Result<T, AdapterError> {
    serde_json::from_value(item).map_err(|source| AdapterError::Malformed { endpoint, source })
}

/// Decode every item, skipping (and logging) the ones that do not fit.
fn decode_lenient<T: DeserializeOwned>(endpoint: Endpoint, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match decode(endpoint, item) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%endpoint, error = %err, "skipping malformed provider item");
                None
            }
        })
        .collect()
}

fn team(raw: RawTeam) -> TeamRef {
    TeamRef {
        id: raw.id,
        name: raw.name,
        logo: raw.logo,
    }
}

fn person_name(raw: Option<RawPerson>) -> Option<String> {
    raw.and_then(|person| person.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// First item of the `fixtures` response, `None` when the provider has no record.
pub fn parse_fixture(items: Vec<Value>) -> Result<Option<Fixture>, AdapterError> {
    let Some(item) = items.into_iter().next() else {
        return Ok(None);
    };
    let raw: RawFixtureItem = decode(Endpoint::Fixture, item)?;
    let fixture_id = raw.fixture.id;

    let kickoff = raw
        .fixture
        .date
        .as_deref()
        .and_then(|date| OffsetDateTime::parse(date, &Rfc3339).ok())
        .or_else(|| {
            raw.fixture
                .timestamp
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        })
        .ok_or(AdapterError::MissingKickoff { fixture_id })?;

    let elapsed = raw.fixture.status.elapsed;
    Ok(Some(Fixture {
        id: fixture_id,
        home: team(raw.teams.home),
        away: team(raw.teams.away),
        league: League {
            id: raw.league.id,
            name: raw.league.name,
            country: raw.league.country,
        },
        kickoff,
        status: FixtureStatus::from_short_code(&raw.fixture.status.short, elapsed),
        elapsed,
        goals: Score {
            home: raw.goals.home.unwrap_or(0),
            away: raw.goals.away.unwrap_or(0),
        },
        venue: raw.fixture.venue.and_then(|venue| venue.name),
    }))
}

/// Decode the events section, skipping items that do not parse.
pub fn parse_events(items: Vec<Value>) -> Vec<RawMatchEvent> {
    decode_lenient::<RawEvent>(Endpoint::Events, items)
        .into_iter()
        .map(|raw| RawMatchEvent {
            provider_id: raw.id.and_then(|id| match id {
                Value::String(id) => Some(id),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            }),
            minute: raw.time.elapsed.unwrap_or(0),
            extra: raw.time.extra,
            event_type: raw.event_type.unwrap_or_default(),
            detail: raw.detail.unwrap_or_default(),
            comments: raw.comments,
            team_id: raw.team.and_then(|team| team.id),
            player: person_name(raw.player),
            assist: person_name(raw.assist),
        })
        .collect()
}

fn stat_value(value: Value) -> StatValue {
    match value {
        Value::Null => StatValue::Missing,
        Value::Number(number) => match number.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(value) => StatValue::Count { value },
            None => StatValue::Text {
                value: number.to_string(),
            },
        },
        Value::String(text) => {
            let trimmed = text.trim();
            if let Some(percent) = trimmed.strip_suffix('%') {
                if let Ok(value) = percent.trim().parse::<u8>() {
                    return StatValue::Percent { value };
                }
            }
            match trimmed.parse::<u32>() {
                Ok(value) => StatValue::Count { value },
                Err(_) => StatValue::Text { value: text },
            }
        }
        other => StatValue::Text {
            value: other.to_string(),
        },
    }
}

/// Decode per-team statistics, skipping items that do not parse.
pub fn parse_statistics(items: Vec<Value>) -> Vec<TeamStatistics> {
    decode_lenient::<RawTeamStatistics>(Endpoint::Statistics, items)
        .into_iter()
        .map(|raw| TeamStatistics {
            team: team(raw.team),
            entries: raw
                .statistics
                .into_iter()
                .map(|stat| StatEntry {
                    name: stat.name,
                    value: stat_value(stat.value),
                })
                .collect(),
        })
        .collect()
}

fn lineup_players(slots: Vec<RawLineupSlot>) -> Vec<LineupPlayer> {
    slots
        .into_iter()
        .filter_map(|slot| {
            let player = slot.player;
            let name = person_name(Some(RawPerson {
                id: player.id,
                name: player.name,
            }))?;
            Some(LineupPlayer {
                id: player.id,
                name,
                number: player.number,
                position: player.pos,
            })
        })
        .collect()
}

/// Decode lineups, skipping items that do not parse.
pub fn parse_lineups(items: Vec<Value>) -> Vec<TeamLineup> {
    decode_lenient::<RawLineup>(Endpoint::Lineups, items)
        .into_iter()
        .map(|raw| TeamLineup {
            team: team(raw.team),
            formation: raw.formation,
            coach: person_name(raw.coach),
            starting: lineup_players(raw.start_xi),
            substitutes: lineup_players(raw.substitutes),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn fixture_item() -> Value {
        json!({
            "fixture": {
                "id": 1035,
                "date": "2026-01-11T15:00:00+00:00",
                "timestamp": 1768143600,
                "status": { "long": "Second Half", "short": "2H", "elapsed": 67 },
                "venue": { "id": 1, "name": "Emirates Stadium" }
            },
            "league": { "id": 39, "name": "Premier League", "country": "England" },
            "teams": {
                "home": { "id": 42, "name": "Arsenal", "logo": "a.png", "winner": null },
                "away": { "id": 49, "name": "Chelsea", "logo": "c.png", "winner": null }
            },
            "goals": { "home": 2, "away": null }
        })
    }

    #[test]
    fn fixture_adapter_builds_typed_fixture() {
        let fixture = parse_fixture(vec![fixture_item()]).unwrap().unwrap();
        assert_eq!(fixture.id, 1035);
        assert_eq!(fixture.kickoff, datetime!(2026-01-11 15:00 UTC));
        assert_eq!(fixture.status, FixtureStatus::SecondHalf);
        assert_eq!(fixture.goals, Score { home: 2, away: 0 });
        assert_eq!(fixture.match_minute(), Some(67));
        assert_eq!(fixture.venue.as_deref(), Some("Emirates Stadium"));
    }

    #[test]
    fn empty_fixture_response_means_no_record() {
        assert!(parse_fixture(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn fixture_without_teams_is_rejected() {
        let err = parse_fixture(vec![json!({ "fixture": { "id": 1 } })]).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn events_adapter_tolerates_nulls_and_skips_garbage() {
        let events = parse_events(vec![
            json!({
                "time": { "elapsed": 23, "extra": null },
                "team": { "id": 42, "name": "Arsenal" },
                "player": { "id": 1, "name": "Saka" },
                "assist": { "id": null, "name": null },
                "type": "Goal",
                "detail": "Normal Goal",
                "comments": null
            }),
            json!("not an event"),
            json!({ "time": { "elapsed": 90, "extra": 4 }, "type": "Card" }),
        ]);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].player.as_deref(), Some("Saka"));
        assert_eq!(events[0].assist, None);
        assert_eq!(events[0].team_id, Some(42));
        assert_eq!(events[1].extra, Some(4));
        assert_eq!(events[1].detail, "");
    }

    #[test]
    fn statistics_values_are_typed() {
        let stats = parse_statistics(vec![json!({
            "team": { "id": 42, "name": "Arsenal" },
            "statistics": [
                { "type": "Shots on Goal", "value": 5 },
                { "type": "Ball Possession", "value": "61%" },
                { "type": "expected_goals", "value": "1.84" },
                { "type": "Red Cards", "value": null }
            ]
        })]);

        let values: Vec<_> = stats[0].entries.iter().map(|e| e.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                StatValue::Count { value: 5 },
                StatValue::Percent { value: 61 },
                StatValue::Text { value: "1.84".into() },
                StatValue::Missing,
            ]
        );
    }

    #[test]
    fn lineups_adapter_reads_starting_eleven() {
        let lineups = parse_lineups(vec![json!({
            "team": { "id": 49, "name": "Chelsea" },
            "formation": "4-2-3-1",
            "coach": { "id": 7, "name": "Coach" },
            "startXI": [ { "player": { "id": 3, "name": "Keeper", "number": 1, "pos": "G" } } ],
            "substitutes": [ { "player": { "id": null, "name": "", "number": 30, "pos": "D" } } ]
        })]);

        assert_eq!(lineups[0].formation.as_deref(), Some("4-2-3-1"));
        assert_eq!(lineups[0].coach.as_deref(), Some("Coach"));
        assert_eq!(lineups[0].starting[0].number, Some(1));
        assert!(lineups[0].substitutes.is_empty());
    }
}
