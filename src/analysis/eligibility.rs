//! Sport-specific gates applied before any expensive decision step.
//!
//! The gates are pure: the same snapshot always gets the same verdict and no
//! input can make them panic.

use std::fmt;

use crate::analysis::parse::{clock_finished, parse_goals, parse_minute, parse_sets};
use crate::model::{MatchSnapshot, Sport};

/// Minimum current-set games lead that counts as a tennis advantage on its own.
pub const TENNIS_GAMES_LEAD: u32 = 3;

/// Table-tennis set scores that may be recommended.
const TABLE_TENNIS_ACCEPTED: &[(u32, u32)] = &[(1, 0), (2, 0), (0, 1), (0, 2)];

/// Why a snapshot was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingTeams,
    UnparseableScore,
    Finished,
    Level,
    MinuteOutsideWindow(u32),
    LeadTooSmall(u32),
    NoAdvantage,
    MissingTournament,
    SetScoreNotAccepted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTeams => write!(f, "missing participant"),
            Self::UnparseableScore => write!(f, "score does not parse"),
            Self::Finished => write!(f, "match finished"),
            Self::Level => write!(f, "scores level"),
            Self::MinuteOutsideWindow(m) => write!(f, "minute {m} outside window"),
            Self::LeadTooSmall(lead) => write!(f, "lead {lead} too small"),
            Self::NoAdvantage => write!(f, "no set or games advantage"),
            Self::MissingTournament => write!(f, "tournament label missing"),
            Self::SetScoreNotAccepted => write!(f, "set score not accepted"),
        }
    }
}

pub fn is_eligible(snapshot: &MatchSnapshot) -> bool {
    check(snapshot).is_ok()
}

/// Run the gate for the snapshot's sport.
pub fn check(snapshot: &MatchSnapshot) -> Result<(), Rejection> {
    if !snapshot.has_teams() {
        return Err(Rejection::MissingTeams);
    }
    if clock_finished(snapshot.sport, &snapshot.minute) {
        return Err(Rejection::Finished);
    }
    match snapshot.sport {
        Sport::Football => check_football(snapshot),
        Sport::Tennis => check_tennis(snapshot),
        Sport::TableTennis => check_table_tennis(snapshot),
        Sport::Handball => check_handball(snapshot),
    }
}

fn check_football(snapshot: &MatchSnapshot) -> Result<(), Rejection> {
    let score = parse_goals(&snapshot.score).ok_or(Rejection::UnparseableScore)?;
    if score.home == score.away {
        return Err(Rejection::Level);
    }
    let minute = parse_minute(&snapshot.minute);
    if !(25..=75).contains(&minute) {
        return Err(Rejection::MinuteOutsideWindow(minute));
    }
    Ok(())
}

fn check_tennis(snapshot: &MatchSnapshot) -> Result<(), Rejection> {
    let sets = parse_sets(&snapshot.score).ok_or(Rejection::UnparseableScore)?;
    if snapshot.league.trim().is_empty() {
        return Err(Rejection::MissingTournament);
    }
    let set_advantage = sets.home != sets.away;
    let games_advantage = sets.games_lead().unsigned_abs() >= TENNIS_GAMES_LEAD;
    if !set_advantage && !games_advantage {
        return Err(Rejection::NoAdvantage);
    }
    Ok(())
}

fn check_table_tennis(snapshot: &MatchSnapshot) -> Result<(), Rejection> {
    let sets = parse_sets(&snapshot.score).ok_or(Rejection::UnparseableScore)?;
    if !TABLE_TENNIS_ACCEPTED.contains(&(sets.home, sets.away)) {
        return Err(Rejection::SetScoreNotAccepted);
    }
    Ok(())
}

fn check_handball(snapshot: &MatchSnapshot) -> Result<(), Rejection> {
    let score = parse_goals(&snapshot.score).ok_or(Rejection::UnparseableScore)?;
    let lead = score.lead();
    if lead < Sport::Handball.minimum_lead() {
        return Err(Rejection::LeadTooSmall(lead));
    }
    let minute = parse_minute(&snapshot.minute);
    if minute <= 30 {
        return Err(Rejection::MinuteOutsideWindow(minute));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snap(sport: Sport, score: &str, minute: &str, league: &str) -> MatchSnapshot {
        MatchSnapshot {
            sport,
            team1: "Home".into(),
            team2: "Away".into(),
            score: score.into(),
            minute: minute.into(),
            league: league.into(),
            source: "test".into(),
            url: String::new(),
            odds: BTreeMap::new(),
        }
    }

    #[test]
    fn test_football_window_and_draw() {
        assert!(is_eligible(&snap(Sport::Football, "2:1", "67'", "")));
        assert!(is_eligible(&snap(Sport::Football, "1:0", "25", "")));
        assert!(is_eligible(&snap(Sport::Football, "0:2", "75", "")));
        assert_eq!(
            check(&snap(Sport::Football, "1:1", "60", "")),
            Err(Rejection::Level)
        );
        assert_eq!(
            check(&snap(Sport::Football, "1:0", "24", "")),
            Err(Rejection::MinuteOutsideWindow(24))
        );
        assert_eq!(
            check(&snap(Sport::Football, "1:0", "76", "")),
            Err(Rejection::MinuteOutsideWindow(76))
        );
        assert_eq!(
            check(&snap(Sport::Football, "1:0", "90+7", "")),
            Err(Rejection::Finished)
        );
    }

    #[test]
    fn test_tennis_requires_advantage_and_tournament() {
        assert!(is_eligible(&snap(Sport::Tennis, "1-0", "2nd set", "ATP Vienna")));
        assert!(is_eligible(&snap(Sport::Tennis, "2-1", "", "WTA Tokyo")));
        assert!(is_eligible(&snap(Sport::Tennis, "1-1 (4-1)", "", "ATP Basel")));
        assert_eq!(
            check(&snap(Sport::Tennis, "1-1 (3-2)", "", "ATP Basel")),
            Err(Rejection::NoAdvantage)
        );
        assert_eq!(
            check(&snap(Sport::Tennis, "1-0", "", "  ")),
            Err(Rejection::MissingTournament)
        );
    }

    #[test]
    fn test_table_tennis_set_scores() {
        for score in ["1-0", "2-0", "0-1", "0-2"] {
            assert!(is_eligible(&snap(Sport::TableTennis, score, "", "")), "{score}");
        }
        for score in ["1-1", "2-1", "3-0", "0-0"] {
            assert_eq!(
                check(&snap(Sport::TableTennis, score, "", "")),
                Err(Rejection::SetScoreNotAccepted),
                "{score}"
            );
        }
    }

    #[test]
    fn test_handball_lead_and_minute() {
        assert!(is_eligible(&snap(Sport::Handball, "28:22", "48", "")));
        assert_eq!(
            check(&snap(Sport::Handball, "15:12", "50", "")),
            Err(Rejection::LeadTooSmall(3))
        );
        assert_eq!(
            check(&snap(Sport::Handball, "18:10", "30", "")),
            Err(Rejection::MinuteOutsideWindow(30))
        );
        assert_eq!(
            check(&snap(Sport::Handball, "30:20", "66", "")),
            Err(Rejection::Finished)
        );
    }

    #[test]
    fn test_garbage_never_panics_and_is_stable() {
        let inputs = [
            "", ":", "-", "::", "a:b", "999999999999:1", "1:", "(", "1-0 (", "🔥",
            "4294967295:0", "80000000:0", "1-0 (2147483648-1)", "0-1 (0-4294967295)", "4294967295+4294967295",
        ];
        for sport in Sport::ALL {
            for score in inputs {
                for minute in inputs {
                    let s = snap(sport, score, minute, score);
                    assert_eq!(check(&s), check(&s.clone()));
                }
            }
        }
    }

    #[test]
    fn test_oversized_scores_rejected_quietly() {
        // The games part is dropped, the set lead alone still qualifies.
        assert_eq!(check(&snap(Sport::Tennis, "1-0 (2147483648-1)", "", "ATP 500 Vienna")), Ok(()));
        assert_eq!(
            check(&snap(Sport::Handball, "80000000:0", "40", "")),
            Err(Rejection::UnparseableScore)
        );
        assert_eq!(
            check(&snap(Sport::Football, "4294967295:1", "60", "")),
            Err(Rejection::UnparseableScore)
        );
    }

    #[test]
    fn test_missing_team_rejected() {
        let mut s = snap(Sport::Football, "2:1", "60", "");
        s.team2 = " ".into();
        assert_eq!(check(&s), Err(Rejection::MissingTeams));
    }
}
