//! Feature extraction from scraped snapshots.
//!
//! Pure and deterministic: never fetches, never consults a model.

use crate::analysis::keywords::{entity_bonus, league_tier, EntityBonus, LeagueTier};
use crate::analysis::parse::{parse_goals, parse_minute, parse_sets, signed_diff};
use crate::model::{MatchSnapshot, Sport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leader {
    Home,
    Away,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FirstHalf,
    SecondHalf,
    LateSecondHalf,
    /// Racket sports: 1-based index of the set in play.
    Set(u32),
}

impl Phase {
    pub fn label(&self) -> String {
        match self {
            Self::FirstHalf => "first_half".to_string(),
            Self::SecondHalf => "second_half".to_string(),
            Self::LateSecondHalf => "late_second_half".to_string(),
            Self::Set(n) => format!("set_{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    pub sport: Sport,
    /// Goals for clocked sports, sets for racket sports.
    pub home_score: u32,
    pub away_score: u32,
    /// `home_score - away_score`.
    pub goal_difference: i32,
    pub leader: Leader,
    pub minute: u32,
    pub phase: Phase,
    pub sets_won_home: u32,
    pub sets_won_away: u32,
    /// Positive when the home side leads the current set.
    pub games_lead_in_current_set: i32,
    pub league_tier: LeagueTier,
    /// Bonus for the leading participant; `None` when nobody leads.
    pub entity_bonus: EntityBonus,
}

impl Features {
    /// Size of the lead in goals (clocked sports) or sets (racket sports).
    pub fn lead(&self) -> u32 {
        self.goal_difference.unsigned_abs()
    }

    pub fn leader_name<'a>(&self, snapshot: &'a MatchSnapshot) -> Option<&'a str> {
        match self.leader {
            Leader::Home => Some(snapshot.team1.as_str()),
            Leader::Away => Some(snapshot.team2.as_str()),
            Leader::None => None,
        }
    }
}

/// Derive features; `None` when the score does not parse for the sport.
pub fn extract(snapshot: &MatchSnapshot) -> Option<Features> {
    let sport = snapshot.sport;
    let minute = parse_minute(&snapshot.minute);

    let (home, away, sets_home, sets_away, games_lead, phase) = match sport {
        Sport::Football | Sport::Handball => {
            let goals = parse_goals(&snapshot.score)?;
            let phase = clock_phase(sport, minute);
            (goals.home, goals.away, 0, 0, 0, phase)
        }
        Sport::Tennis | Sport::TableTennis => {
            let sets = parse_sets(&snapshot.score)?;
            let phase = Phase::Set(sets.home + sets.away + 1);
            (sets.home, sets.away, sets.home, sets.away, sets.games_lead(), phase)
        }
    };

    let goal_difference = signed_diff(home, away);
    let leader = match goal_difference.signum() {
        1 => Leader::Home,
        -1 => Leader::Away,
        _ if games_lead > 0 => Leader::Home,
        _ if games_lead < 0 => Leader::Away,
        _ => Leader::None,
    };

    let leader_label = match leader {
        Leader::Home => Some(snapshot.team1.as_str()),
        Leader::Away => Some(snapshot.team2.as_str()),
        Leader::None => None,
    };

    Some(Features {
        sport,
        home_score: home,
        away_score: away,
        goal_difference,
        leader,
        minute,
        phase,
        sets_won_home: sets_home,
        sets_won_away: sets_away,
        games_lead_in_current_set: games_lead,
        league_tier: league_tier(sport, &snapshot.league),
        entity_bonus: leader_label
            .map(|label| entity_bonus(sport, label))
            .unwrap_or(EntityBonus::None),
    })
}

fn clock_phase(sport: Sport, minute: u32) -> Phase {
    let regulation = sport.regulation_minutes().unwrap_or(90);
    let half = regulation / 2;
    let late = regulation * 5 / 6;
    if minute <= half {
        Phase::FirstHalf
    } else if minute <= late {
        Phase::SecondHalf
    } else {
        Phase::LateSecondHalf
    }
}
