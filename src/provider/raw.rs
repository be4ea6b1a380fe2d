//! Wire shapes of the provider payloads, limited to the consumed fields.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: Vec<Value>,
    /// `[]` on success, an object of messages on failure.
    #[serde(default)]
    pub errors: Value,
}

impl Envelope {
    pub fn error_message(&self) -> Option<String> {
        let messages: Vec<String> = match &self.errors {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| match value {
                    Value::String(text) => format!("{key}: {text}"),
                    other => format!("{key}: {other}"),
                })
                .collect(),
            Value::Array(items) => items.iter().map(Value::to_string).collect(),
            _ => Vec::new(),
        };
        (!messages.is_empty()).then(|| messages.join("; "))
    }
}

#[derive(Debug, Deserialize)]
pub struct RawFixtureItem {
    pub fixture: RawFixtureInfo,
    pub league: RawLeague,
    pub teams: RawTeams,
    #[serde(default)]
    pub goals: RawGoals,
}

#[derive(Debug, Deserialize)]
pub struct RawFixtureInfo {
    pub id: u64,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
    pub status: RawStatus,
    pub venue: Option<RawVenue>,
}

#[derive(Debug, Deserialize)]
pub struct RawStatus {
    pub short: String,
    pub elapsed: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawVenue {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawLeague {
    pub id: u64,
    pub name: String,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTeams {
    pub home: RawTeam,
    pub away: RawTeam,
}

#[derive(Debug, Deserialize)]
pub struct RawTeam {
    pub id: u64,
    pub name: String,
    pub logo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawGoals {
    pub home: Option<u16>,
    pub away: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub id: Option<Value>,
    pub time: RawEventTime,
    pub team: Option<RawPerson>,
    pub player: Option<RawPerson>,
    pub assist: Option<RawPerson>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub detail: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawEventTime {
    pub elapsed: Option<u16>,
    pub extra: Option<u16>,
}

/// `{id, name}` pair used for players, coaches and event teams, where the
/// provider may null out either field.
#[derive(Debug, Deserialize)]
pub struct RawPerson {
    pub id: Option<u64>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTeamStatistics {
    pub team: RawTeam,
    #[serde(default)]
    pub statistics: Vec<RawStatistic>,
}

#[derive(Debug, Deserialize)]
pub struct RawStatistic {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct RawLineup {
    pub team: RawTeam,
    pub formation: Option<String>,
    pub coach: Option<RawPerson>,
    #[serde(rename = "startXI", default)]
    pub start_xi: Vec<RawLineupSlot>,
    #[serde(default)]
    pub substitutes: Vec<RawLineupSlot>,
}

#[derive(Debug, Deserialize)]
pub struct RawLineupSlot {
    pub player: RawLineupPlayer,
}

#[derive(Debug, Deserialize)]
pub struct RawLineupPlayer {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub number: Option<u16>,
    pub pos: Option<String>,
}
