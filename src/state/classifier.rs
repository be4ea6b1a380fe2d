//! Turns raw provider events into the typed match timeline.
//!
//! Classification is an ordered rule table evaluated top to bottom; the first
//! matching rule decides the kind and [`EventKind::Shot`] catches the rest.
//! Each raw event yields exactly one classified event.

use super::fixture::{
    ClassifiedEvent, EventDetails, EventKind, Fixture, GoalType, RawMatchEvent, Score, Side,
};

/// Lowercased text fields a rule inspects.
struct EventText {
    event_type: String,
    detail: String,
    comments: String,
}

impl EventText {
    fn new(raw: &RawMatchEvent) -> Self {
        Self {
            event_type: raw.event_type.trim().to_lowercase(),
            detail: raw.detail.trim().to_lowercase(),
            comments: raw
                .comments
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_lowercase(),
        }
    }

    fn type_is(&self, value: &str) -> bool {
        self.event_type == value
    }

    /// Keyword search over every text field.
    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| {
            self.detail.contains(needle)
                || self.comments.contains(needle)
                || self.event_type.contains(needle)
        })
    }
}

type Rule = (EventKind, fn(&EventText) -> bool);

/// Order matters: VAR reviews mention goals and missed penalties are filed
/// as goals by the provider, so both run before the plain goal rule.
const RULES: &[Rule] = &[
    (EventKind::Var, |t| t.type_is("var")),
    (EventKind::ShotOffTarget, |t| {
        t.type_is("goal") && t.mentions(&["missed penalty"])
    }),
    (EventKind::Goal, |t| t.type_is("goal")),
    (EventKind::RedCard, |t| {
        t.type_is("card") && t.mentions(&["red", "second yellow"])
    }),
    (EventKind::YellowCard, |t| t.type_is("card")),
    (EventKind::Substitution, |t| {
        t.type_is("subst") || t.type_is("substitution")
    }),
    (EventKind::Save, |t| t.mentions(&["save"])),
    (EventKind::BlockedShot, |t| t.mentions(&["blocked"])),
    (EventKind::ShotOnTarget, |t| t.mentions(&["on target"])),
    (EventKind::ShotOffTarget, |t| {
        t.mentions(&["off target", "woodwork", "hits the post", "hit the post", "crossbar", "wide"])
    }),
    (EventKind::Offside, |t| t.mentions(&["offside"])),
    (EventKind::Foul, |t| t.mentions(&["foul"])),
    (EventKind::Corner, |t| t.mentions(&["corner"])),
    (EventKind::PeriodMarker, |t| {
        t.mentions(&[
            "kick off",
            "kick-off",
            "half time",
            "half-time",
            "halftime",
            "second half",
            "full time",
            "full-time",
            "extra time",
            "penalty shootout",
        ])
    }),
];

/// Kind of a single raw event.
pub fn classify_kind(raw: &RawMatchEvent) -> EventKind {
    let text = EventText::new(raw);
    RULES
        .iter()
        .find(|(_, matches)| matches(&text))
        .map(|(kind, _)| *kind)
        .unwrap_or(EventKind::Shot)
}

fn side_of(raw: &RawMatchEvent, fixture: &Fixture) -> Side {
    match raw.team_id {
        Some(id) if id == fixture.home.id => Side::Home,
        Some(id) if id == fixture.away.id => Side::Away,
        _ => Side::Neutral,
    }
}

/// Classify a whole feed against its fixture.
///
/// Events are stably sorted by `(minute, extra)`; goals attributed to a side
/// advance the running score and carry the score after applying them.
pub fn classify_events(fixture: &Fixture, raw_events: &[RawMatchEvent]) -> Vec<ClassifiedEvent> {
    let mut ordered: Vec<&RawMatchEvent> = raw_events.iter().collect();
    ordered.sort_by_key(|event| (event.minute, stoppage(event).unwrap_or(0)));

    let mut score = Score::default();
    let mut classified = Vec::with_capacity(ordered.len());
    let mut slot: Option<(u16, Option<u16>)> = None;
    let mut ordinal = 0usize;

    for raw in ordered {
        let extra = stoppage(raw);
        if slot == Some((raw.minute, extra)) {
            ordinal += 1;
        } else {
            slot = Some((raw.minute, extra));
            ordinal = 0;
        }

        let kind = classify_kind(raw);
        let side = side_of(raw, fixture);
        if kind == EventKind::Goal {
            match side {
                Side::Home => score.home += 1,
                Side::Away => score.away += 1,
                Side::Neutral => {}
            }
        }

        let details = details_for(kind, raw, score);
        let team = team_name(fixture, side);
        classified.push(ClassifiedEvent {
            id: event_id(raw, extra, ordinal),
            minute: raw.minute,
            extra,
            kind,
            side,
            title: title_for(kind, &details),
            description: describe(kind, &details, team),
            details,
        });
    }

    classified
}

/// Stoppage minutes of an event; a reported `0` means none.
fn stoppage(raw: &RawMatchEvent) -> Option<u16> {
    raw.extra.filter(|extra| *extra > 0)
}

fn event_id(raw: &RawMatchEvent, extra: Option<u16>, ordinal: usize) -> String {
    if let Some(id) = raw.provider_id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    match extra {
        Some(extra) => format!("{}+{}-{}", raw.minute, extra, ordinal),
        None => format!("{}-{}", raw.minute, ordinal),
    }
}

fn team_name(fixture: &Fixture, side: Side) -> Option<&str> {
    match side {
        Side::Home => Some(fixture.home.name.as_str()),
        Side::Away => Some(fixture.away.name.as_str()),
        Side::Neutral => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn details_for(kind: EventKind, raw: &RawMatchEvent, score: Score) -> EventDetails {
    let player = non_empty(raw.player.as_deref());
    let detail = raw.detail.trim().to_string();
    match kind {
        EventKind::Goal => {
            let lowered = detail.to_lowercase();
            let goal_type = if lowered.contains("own goal") {
                GoalType::OwnGoal
            } else if lowered.contains("penalty") {
                GoalType::Penalty
            } else {
                GoalType::Normal
            };
            EventDetails::Goal {
                scorer: player,
                assist: non_empty(raw.assist.as_deref()),
                goal_type,
                score_after: score,
            }
        }
        EventKind::YellowCard | EventKind::RedCard => EventDetails::Card {
            player,
            reason: non_empty(raw.comments.as_deref()),
        },
        // The provider lists the outgoing player first and the incoming one as "assist".
        EventKind::Substitution => EventDetails::Substitution {
            player_on: non_empty(raw.assist.as_deref()),
            player_off: player,
        },
        EventKind::ShotOnTarget
        | EventKind::ShotOffTarget
        | EventKind::BlockedShot
        | EventKind::Shot => EventDetails::Shot { shooter: player },
        EventKind::Save => EventDetails::Save { goalkeeper: player },
        EventKind::Var => EventDetails::Var { decision: detail },
        EventKind::PeriodMarker => EventDetails::Period { label: detail },
        EventKind::Corner | EventKind::Offside | EventKind::Foul => {
            EventDetails::Player { player }
        }
    }
}

fn title_for(kind: EventKind, details: &EventDetails) -> String {
    let title = match (kind, details) {
        (EventKind::Goal, EventDetails::Goal { goal_type, .. }) => match goal_type {
            GoalType::Normal => "Goal",
            GoalType::Penalty => "Penalty Goal",
            GoalType::OwnGoal => "Own Goal",
        },
        (EventKind::Goal, _) => "Goal",
        (EventKind::YellowCard, _) => "Yellow Card",
        (EventKind::RedCard, _) => "Red Card",
        (EventKind::Substitution, _) => "Substitution",
        (EventKind::Corner, _) => "Corner",
        (EventKind::ShotOnTarget, _) => "Shot on Target",
        (EventKind::ShotOffTarget, _) => "Shot off Target",
        (EventKind::BlockedShot, _) => "Blocked Shot",
        (EventKind::Save, _) => "Save",
        (EventKind::Offside, _) => "Offside",
        (EventKind::Foul, _) => "Foul",
        (EventKind::Var, _) => "VAR",
        (EventKind::PeriodMarker, EventDetails::Period { label }) if !label.is_empty() => {
            return label.clone();
        }
        (EventKind::PeriodMarker, _) => "Period",
        (EventKind::Shot, _) => "Shot",
    };
    title.to_string()
}

fn describe(kind: EventKind, details: &EventDetails, team: Option<&str>) -> String {
    const SOMEONE: &str = "Unknown player";
    let team = team.unwrap_or("their side");

    match details {
        EventDetails::Goal {
            scorer,
            assist,
            goal_type,
            ..
        } => {
            let scorer = scorer.as_deref().unwrap_or(SOMEONE);
            let mut text = match goal_type {
                GoalType::OwnGoal => format!("Goal! {scorer} puts it into their own net, {team} benefit."),
                GoalType::Penalty => format!("Goal! {scorer} converts the penalty for {team}."),
                GoalType::Normal => format!("Goal! {scorer} scores for {team}."),
            };
            if let Some(assist) = assist {
                text.push_str(&format!(" Assisted by {assist}."));
            }
            text
        }
        EventDetails::Card { player, reason } => {
            let player = player.as_deref().unwrap_or(SOMEONE);
            let colour = if kind == EventKind::RedCard { "Red" } else { "Yellow" };
            match reason {
                Some(reason) => format!("{colour} card for {player} ({team}): {reason}."),
                None => format!("{colour} card for {player} ({team})."),
            }
        }
        EventDetails::Substitution {
            player_on,
            player_off,
        } => format!(
            "{} replaces {} for {team}.",
            player_on.as_deref().unwrap_or(SOMEONE),
            player_off.as_deref().unwrap_or(SOMEONE)
        ),
        EventDetails::Shot { shooter } => {
            let shooter = shooter.as_deref().unwrap_or(SOMEONE);
            match kind {
                EventKind::ShotOnTarget => format!("{shooter} forces a save with a shot on target."),
                EventKind::ShotOffTarget => format!("{shooter} fires off target."),
                EventKind::BlockedShot => format!("{shooter} has a shot blocked."),
                _ => format!("Attempt by {shooter} ({team})."),
            }
        }
        EventDetails::Save { goalkeeper } => format!(
            "Save by {} for {team}.",
            goalkeeper.as_deref().unwrap_or(SOMEONE)
        ),
        EventDetails::Var { decision } if decision.is_empty() => "VAR review.".to_string(),
        EventDetails::Var { decision } => format!("VAR review: {decision}."),
        EventDetails::Period { label } if label.is_empty() => "Period change.".to_string(),
        EventDetails::Period { label } => format!("{label}."),
        EventDetails::Player { player } => {
            let player = player.as_deref();
            match (kind, player) {
                (EventKind::Corner, _) => format!("Corner for {team}."),
                (EventKind::Offside, Some(player)) => format!("{player} is caught offside."),
                (EventKind::Offside, None) => format!("Offside against {team}."),
                (_, Some(player)) => format!("Foul by {player} ({team})."),
                (_, None) => format!("Foul by {team}."),
            }
        }
    }
}
