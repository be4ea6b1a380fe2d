//! Decides whether a fixture gets a chat room and whether it is open right now.
//!
//! Everything here is a pure function of the fixture metadata and the supplied
//! instant, so identical inputs always produce identical routing.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

use super::fixture::{Fixture, League};

/// Chat opens this long before kickoff.
pub const OPENS_BEFORE_KICKOFF: Duration = Duration::minutes(45);
/// Chat closes this long after kickoff, whatever the reported status.
pub const CLOSES_AFTER_KICKOFF: Duration = Duration::minutes(130);

/// Whether a chat room is reachable at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    NotYetEligible,
    Open,
    Closed,
}

/// Screen a client should show for a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChatRoute {
    Preview,
    LiveRoom,
    Summary,
}

impl From<AccessState> for ChatRoute {
    fn from(state: AccessState) -> Self {
        match state {
            AccessState::NotYetEligible => ChatRoute::Preview,
            AccessState::Open => ChatRoute::LiveRoom,
            AccessState::Closed => ChatRoute::Summary,
        }
    }
}

/// Time span during which a fixture's room accepts viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatAccessWindow {
    pub opens_at: OffsetDateTime,
    pub closes_at: OffsetDateTime,
    pub eligible: bool,
    pub state: AccessState,
}

/// League reference in the eligibility lists. Matches by provider id when one
/// is given, and by case-insensitive name otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeagueRule {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

impl LeagueRule {
    fn new(id: u64, name: &str) -> Self {
        Self {
            id: Some(id),
            name: name.to_string(),
        }
    }

    fn matches(&self, league: &League) -> bool {
        self.id.is_some_and(|id| id == league.id) || same_name(&self.name, &league.name)
    }
}

/// Teams that make any fixture of a given league worth a room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarqueeRule {
    pub league: LeagueRule,
    pub teams: Vec<String>,
}

/// Lists deciding which fixtures are chat-eligible.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EligibilityRules {
    pub top_leagues: Vec<LeagueRule>,
    pub major_tournaments: Vec<LeagueRule>,
    pub priority_teams: Vec<String>,
    pub rivalries: Vec<(String, String)>,
    pub marquee: Vec<MarqueeRule>,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|name| name.to_string()).collect()
        }
        fn pair(a: &str, b: &str) -> (String, String) {
            (a.to_string(), b.to_string())
        }

        Self {
            top_leagues: vec![
                LeagueRule::new(39, "Premier League"),
                LeagueRule::new(140, "La Liga"),
                LeagueRule::new(135, "Serie A"),
                LeagueRule::new(78, "Bundesliga"),
            ],
            major_tournaments: vec![
                LeagueRule::new(1, "World Cup"),
                LeagueRule::new(2, "UEFA Champions League"),
                LeagueRule::new(3, "UEFA Europa League"),
                LeagueRule::new(848, "UEFA Europa Conference League"),
                LeagueRule::new(4, "Euro Championship"),
                LeagueRule::new(9, "Copa America"),
                LeagueRule::new(6, "Africa Cup of Nations"),
            ],
            priority_teams: names(&[
                "Real Madrid",
                "Barcelona",
                "Atletico Madrid",
                "Manchester United",
                "Manchester City",
                "Liverpool",
                "Arsenal",
                "Chelsea",
                "Tottenham",
                "Bayern Munich",
                "Borussia Dortmund",
                "Juventus",
                "AC Milan",
                "Inter",
            ]),
            rivalries: vec![
                pair("Boca Juniors", "River Plate"),
                pair("Celtic", "Rangers"),
                pair("Fenerbahce", "Galatasaray"),
                pair("Flamengo", "Fluminense"),
                pair("Al Ahly", "Zamalek"),
                pair("Club America", "Guadalajara Chivas"),
            ],
            marquee: vec![
                MarqueeRule {
                    league: LeagueRule::new(61, "Ligue 1"),
                    teams: names(&["Paris Saint Germain", "Marseille"]),
                },
                MarqueeRule {
                    league: LeagueRule::new(88, "Eredivisie"),
                    teams: names(&["Ajax", "PSV Eindhoven", "Feyenoord"]),
                },
                MarqueeRule {
                    league: LeagueRule::new(94, "Primeira Liga"),
                    teams: names(&["Benfica", "FC Porto", "Sporting CP"]),
                },
                MarqueeRule {
                    league: LeagueRule::new(253, "Major League Soccer"),
                    teams: names(&["Inter Miami"]),
                },
            ],
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn contains_name(list: &[String], name: &str) -> bool {
    list.iter().any(|candidate| same_name(candidate, name))
}

/// Stateless gate in front of the chat rooms.
#[derive(Debug, Clone, Default)]
pub struct ChatAccessController {
    rules: EligibilityRules,
}

impl ChatAccessController {
    pub fn new(rules: EligibilityRules) -> Self {
        Self { rules }
    }

    /// Whether the fixture deserves a chat room at all.
    pub fn is_eligible(&self, fixture: &Fixture) -> bool {
        let rules = &self.rules;
        let home = fixture.home.name.as_str();
        let away = fixture.away.name.as_str();

        rules.top_leagues.iter().any(|rule| rule.matches(&fixture.league))
            || rules
                .major_tournaments
                .iter()
                .any(|rule| rule.matches(&fixture.league))
            || contains_name(&rules.priority_teams, home)
            || contains_name(&rules.priority_teams, away)
            || rules.rivalries.iter().any(|(a, b)| {
                (same_name(a, home) && same_name(b, away))
                    || (same_name(a, away) && same_name(b, home))
            })
            || rules.marquee.iter().any(|rule| {
                rule.league.matches(&fixture.league)
                    && (contains_name(&rule.teams, home) || contains_name(&rule.teams, away))
            })
    }

    /// Full access window for `fixture` at `now`.
    pub fn can_enable_chat(&self, fixture: &Fixture, now: OffsetDateTime) -> ChatAccessWindow {
        let opens_at = fixture.kickoff - OPENS_BEFORE_KICKOFF;
        let closes_at = fixture.kickoff + CLOSES_AFTER_KICKOFF;
        let eligible = self.is_eligible(fixture);

        let state = if now < opens_at {
            AccessState::NotYetEligible
        } else if now <= closes_at && eligible {
            AccessState::Open
        } else {
            AccessState::Closed
        };

        ChatAccessWindow {
            opens_at,
            closes_at,
            eligible,
            state,
        }
    }

    pub fn route(&self, fixture: &Fixture, now: OffsetDateTime) -> ChatRoute {
        self.can_enable_chat(fixture, now).state.into()
    }
}

/// Chat room key of a fixture.
pub fn room_id_for(fixture_id: u64) -> String {
    format!("match:{fixture_id}")
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::state::fixture::{FixtureStatus, Score, TeamRef};

    fn fixture(league: (u64, &str), home: &str, away: &str) -> Fixture {
        Fixture {
            id: 7,
            home: TeamRef {
                id: 1,
                name: home.into(),
                logo: None,
            },
            away: TeamRef {
                id: 2,
                name: away.into(),
                logo: None,
            },
            league: League {
                id: league.0,
                name: league.1.into(),
                country: None,
            },
            kickoff: datetime!(2026-01-11 15:00 UTC),
            status: FixtureStatus::NotStarted,
            elapsed: None,
            goals: Score::default(),
            venue: None,
        }
    }

    fn premier_league() -> Fixture {
        fixture((39, "Premier League"), "Everton", "Fulham")
    }

    #[test]
    fn window_boundaries_around_kickoff() {
        let controller = ChatAccessController::default();
        let fixture = premier_league();

        let at = |now| controller.can_enable_chat(&fixture, now).state;
        assert_eq!(at(datetime!(2026-01-11 14:16 UTC)), AccessState::Open);
        assert_eq!(at(datetime!(2026-01-11 14:15 UTC)), AccessState::Open);
        assert_eq!(at(datetime!(2026-01-11 14:14 UTC)), AccessState::NotYetEligible);
        assert_eq!(at(datetime!(2026-01-11 17:10 UTC)), AccessState::Open);
        assert_eq!(at(datetime!(2026-01-11 17:20 UTC)), AccessState::Closed);

        let window = controller.can_enable_chat(&fixture, datetime!(2026-01-11 12:00 UTC));
        assert_eq!(window.opens_at, datetime!(2026-01-11 14:15 UTC));
        assert_eq!(window.closes_at, datetime!(2026-01-11 17:10 UTC));
    }

    #[test]
    fn closes_even_when_provider_still_reports_live() {
        let controller = ChatAccessController::default();
        let mut fixture = premier_league();
        fixture.status = FixtureStatus::SecondHalf;
        let window = controller.can_enable_chat(&fixture, datetime!(2026-01-11 17:30 UTC));
        assert_eq!(window.state, AccessState::Closed);
    }

    #[test]
    fn ligue_one_without_priority_teams_is_ineligible() {
        let controller = ChatAccessController::default();
        let fixture = fixture((61, "Ligue 1"), "Lens", "Lille");

        for now in [
            datetime!(2026-01-11 13:00 UTC),
            datetime!(2026-01-11 15:00 UTC),
            datetime!(2026-01-11 18:00 UTC),
        ] {
            let window = controller.can_enable_chat(&fixture, now);
            assert!(!window.eligible);
            assert_ne!(window.state, AccessState::Open);
        }
    }

    #[test]
    fn eligibility_sources() {
        let controller = ChatAccessController::default();
        assert!(controller.is_eligible(&fixture((2, "UEFA Champions League"), "Celtic", "Porto")));
        assert!(controller.is_eligible(&fixture((999, "Friendlies"), "  real madrid ", "X")));
        assert!(controller.is_eligible(&fixture((500, "Liga Profesional"), "River Plate", "Boca Juniors")));
        assert!(controller.is_eligible(&fixture((61, "Ligue 1"), "Lens", "Paris Saint Germain")));
        assert!(controller.is_eligible(&fixture((0, "serie a"), "Lecce", "Empoli")));
        assert!(!controller.is_eligible(&fixture((88, "Eredivisie"), "Twente", "Utrecht")));
    }

    #[test]
    fn routing_follows_the_clock() {
        let controller = ChatAccessController::default();
        let fixture = premier_league();
        let kickoff = fixture.kickoff;

        assert_eq!(controller.route(&fixture, kickoff - Duration::minutes(50)), ChatRoute::Preview);
        assert_eq!(controller.route(&fixture, kickoff - Duration::minutes(10)), ChatRoute::LiveRoom);
        assert_eq!(controller.route(&fixture, kickoff + Duration::minutes(150)), ChatRoute::Summary);
        assert_eq!(
            controller.route(&fixture, kickoff - Duration::minutes(10)),
            controller.route(&fixture, kickoff - Duration::minutes(10))
        );
    }
}
