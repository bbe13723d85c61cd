//! Closed-form win scoring used when no model is available.
//!
//! Deterministic over extractor outputs, so it doubles as the reference
//! behaviour the pipeline is tested against.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::analysis::features::{Features, Leader};
use crate::analysis::keywords::{EntityBonus, LeagueTier};
use crate::decision::coefficient;
use crate::model::{MatchSnapshot, Recommendation, RecommendationKind, Sport};

pub const BASE_CONFIDENCE: Decimal = dec!(0.75);
pub const MAX_CONFIDENCE: Decimal = dec!(0.95);

const LEAD_STEP: Decimal = dec!(0.05);
const LEAD_CAP: Decimal = dec!(0.20);
const TIME_STEP: Decimal = dec!(0.02);
const TIME_CAP: Decimal = dec!(0.10);
const TIME_STEP_MINUTES: u32 = 5;

/// Individual contributions to a heuristic confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakdown {
    pub lead: Decimal,
    pub time: Decimal,
    pub league: Decimal,
    pub entity: Decimal,
    pub confidence: Decimal,
}

/// +0.02 per whole 5 minutes past the midpoint of the sport's acceptance
/// window, capped at +0.10. Racket sports have no clock and get nothing.
pub fn time_bonus(sport: Sport, minute: u32) -> Decimal {
    let Some((low, high)) = sport.acceptance_window() else {
        return Decimal::ZERO;
    };
    let midpoint = (low + high) / 2;
    let steps = minute.saturating_sub(midpoint) / TIME_STEP_MINUTES;
    (TIME_STEP * Decimal::from(steps)).min(TIME_CAP)
}

fn lead_bonus(features: &Features) -> Decimal {
    let above = features.lead().saturating_sub(features.sport.minimum_lead());
    (LEAD_STEP * Decimal::from(above)).min(LEAD_CAP)
}

pub fn league_bonus(tier: LeagueTier) -> Decimal {
    match tier {
        LeagueTier::Top => dec!(0.05),
        LeagueTier::Mid => Decimal::ZERO,
        LeagueTier::Low => dec!(-0.05),
    }
}

fn entity_bonus(bonus: EntityBonus) -> Decimal {
    match bonus {
        EntityBonus::Large => dec!(0.08),
        EntityBonus::Small => dec!(0.03),
        EntityBonus::None => Decimal::ZERO,
    }
}

pub fn score(features: &Features) -> Breakdown {
    let lead = lead_bonus(features);
    let time = time_bonus(features.sport, features.minute);
    let league = league_bonus(features.league_tier);
    let entity = entity_bonus(features.entity_bonus);
    let confidence = (BASE_CONFIDENCE + lead + time + league + entity)
        .max(Decimal::ZERO)
        .min(MAX_CONFIDENCE);

    Breakdown { lead, time, league, entity, confidence }
}

/// Label for a win by the leading side: `П1`/`П2` for team sports,
/// `Victory of <name>` for racket sports.
pub fn win_value(snapshot: &MatchSnapshot, features: &Features) -> Option<String> {
    let name = features.leader_name(snapshot)?;
    if snapshot.sport.is_clocked() {
        match features.leader {
            Leader::Home => Some("П1".to_string()),
            Leader::Away => Some("П2".to_string()),
            Leader::None => None,
        }
    } else {
        Some(format!("Victory of {}", name.trim()))
    }
}

fn rationale(snapshot: &MatchSnapshot, features: &Features, breakdown: &Breakdown) -> String {
    let leader = features.leader_name(snapshot).unwrap_or_default().trim();
    let mut opening = format!("{leader} leads {}", snapshot.score.trim());
    if snapshot.sport.is_clocked() {
        opening.push_str(&format!(" at minute {}", features.minute));
    }

    let mut factors: Vec<&str> = Vec::new();
    if breakdown.lead > Decimal::ZERO {
        factors.push("comfortable margin");
    }
    if !snapshot.sport.is_clocked() {
        factors.push(if features.lead() > 0 { "up in sets" } else { "clear games lead in the current set" });
    }
    if breakdown.time > Decimal::ZERO {
        factors.push("little time left");
    }
    match features.league_tier {
        LeagueTier::Top => factors.push("top-tier competition"),
        LeagueTier::Low => factors.push("lower-tier competition"),
        LeagueTier::Mid => {}
    }
    match features.entity_bonus {
        EntityBonus::Large => factors.push("elite side"),
        EntityBonus::Small => factors.push("strong side"),
        EntityBonus::None => {}
    }

    if factors.is_empty() {
        format!("{opening}.")
    } else {
        format!("{opening}; {}.", factors.join(", "))
    }
}

/// Recommendation iff a leader exists and the score clears the sport threshold.
pub fn decide(snapshot: &MatchSnapshot, features: &Features) -> Option<Recommendation> {
    let value = win_value(snapshot, features)?;
    let breakdown = score(features);
    if breakdown.confidence < snapshot.sport.threshold() {
        return None;
    }

    Some(Recommendation {
        snapshot: snapshot.clone(),
        kind: RecommendationKind::Win,
        value,
        confidence: breakdown.confidence,
        rationale: rationale(snapshot, features, &breakdown),
        coefficient: Some(coefficient::resolve(
            snapshot,
            coefficient::win_labels(features.leader),
            breakdown.confidence,
        )),
        decided_by: "heuristic".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::extract;
    use std::collections::BTreeMap;

    fn snap(sport: Sport, team1: &str, team2: &str, score: &str, minute: &str, league: &str) -> MatchSnapshot {
        MatchSnapshot {
            sport,
            team1: team1.into(),
            team2: team2.into(),
            score: score.into(),
            minute: minute.into(),
            league: league.into(),
            source: "test".into(),
            url: String::new(),
            odds: BTreeMap::new(),
        }
    }

    #[test]
    fn test_time_bonus_steps() {
        assert_eq!(time_bonus(Sport::Football, 50), Decimal::ZERO);
        assert_eq!(time_bonus(Sport::Football, 54), Decimal::ZERO);
        assert_eq!(time_bonus(Sport::Football, 55), dec!(0.02));
        assert_eq!(time_bonus(Sport::Football, 67), dec!(0.06));
        assert_eq!(time_bonus(Sport::Football, 75), dec!(0.10));
        assert_eq!(time_bonus(Sport::Football, 95), dec!(0.10));
        assert_eq!(time_bonus(Sport::Handball, 50), dec!(0.02));
        assert_eq!(time_bonus(Sport::Tennis, 80), Decimal::ZERO);
    }

    #[test]
    fn test_top_league_favourite() {
        let s = snap(Sport::Football, "Manchester City", "Brighton", "2:1", "67", "Premier League");
        let f = extract(&s).unwrap();
        let b = score(&f);
        assert_eq!(b.lead, Decimal::ZERO);
        assert_eq!(b.time, dec!(0.06));
        assert_eq!(b.league, dec!(0.05));
        assert_eq!(b.entity, dec!(0.08));
        assert_eq!(b.confidence, dec!(0.94));

        let rec = decide(&s, &f).unwrap();
        assert_eq!(rec.value, "П1");
        assert_eq!(rec.kind, RecommendationKind::Win);
        assert_eq!(rec.coefficient, Some(dec!(1.25)));
        assert!(rec.rationale.starts_with("Manchester City leads 2:1 at minute 67"));
        assert!(rec.is_valid());
    }

    #[test]
    fn test_confidence_clamped() {
        let s = snap(Sport::Football, "Real Madrid", "Getafe", "5:0", "75", "LaLiga");
        let b = score(&extract(&s).unwrap());
        assert_eq!(b.lead, dec!(0.20));
        assert_eq!(b.confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn test_below_threshold_dropped() {
        let s = snap(Sport::Football, "A", "B", "1:0", "40", "Regional U19");
        let f = extract(&s).unwrap();
        assert_eq!(score(&f).confidence, dec!(0.70));
        assert!(decide(&s, &f).is_none());
    }

    #[test]
    fn test_monotonic_in_goal_difference() {
        let mut previous = Decimal::ZERO;
        for home in 1..=8 {
            let s = snap(Sport::Handball, "A", "B", &format!("{}:0", home + 3), "50", "");
            let c = score(&extract(&s).unwrap()).confidence;
            assert!(c >= previous, "lead {home}");
            previous = c;
        }
    }

    #[test]
    fn test_monotonic_in_minute_within_window() {
        for sport in [Sport::Football, Sport::Handball] {
            let (low, high) = sport.acceptance_window().unwrap();
            let mut previous = Decimal::ZERO;
            for minute in low..=high {
                let s = snap(sport, "A", "B", "10:4", &minute.to_string(), "");
                let c = score(&extract(&s).unwrap()).confidence;
                assert!(c >= previous, "{sport} minute {minute}");
                previous = c;
            }
        }
    }

    #[test]
    fn test_racket_value_names_leader() {
        let s = snap(Sport::Tennis, "Sinner", "Ruud", "0-1", "2nd set", "ATP Vienna");
        let rec = decide(&s, &extract(&s).unwrap()).unwrap();
        assert_eq!(rec.value, "Victory of Ruud");
        assert_eq!(rec.confidence, dec!(0.78));
    }

    #[test]
    fn test_level_match_has_no_value() {
        let s = snap(Sport::Tennis, "A", "B", "1-1 (2-2)", "", "ATP");
        let f = extract(&s).unwrap();
        assert!(win_value(&s, &f).is_none());
        assert!(decide(&s, &f).is_none());
    }
}
