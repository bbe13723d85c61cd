//! Over/under projection for handball.
//!
//! The goal rate so far is extrapolated to 60 minutes: `T = ceil(G * 60 / m)`.
//! A fast match (more goals than minutes played) gets `Over (T - 4)`, anything
//! else `Under (T + 3)`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::analysis::keywords::{league_tier, LeagueTier};
use crate::analysis::parse::{clock_finished, parse_goals, parse_minute};
use crate::decision::{coefficient, heuristic};
use crate::model::{MatchSnapshot, Recommendation, RecommendationKind, Sport};

const REGULATION_MINUTES: u32 = 60;
/// Earliest minute (exclusive) at which the goal rate is trusted.
const MIN_MINUTE: u32 = 30;
const OVER_MARGIN: u32 = 4;
const UNDER_MARGIN: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsProjection {
    pub goals: u32,
    pub minute: u32,
    pub predicted_total: u32,
    pub fast_tempo: bool,
    /// Line of the recommended bet.
    pub line: u32,
}

impl TotalsProjection {
    pub fn value(&self) -> String {
        if self.fast_tempo {
            format!("Over {}", self.line)
        } else {
            format!("Under {}", self.line)
        }
    }

    /// Goals per minute so far.
    pub fn goals_per_minute(&self) -> Decimal {
        Decimal::from(self.goals) / Decimal::from(self.minute)
    }
}

/// Project the final total; `None` for `minute <= 30` or counts too large to project.
pub fn project(home: u32, away: u32, minute: u32) -> Option<TotalsProjection> {
    if minute <= MIN_MINUTE {
        return None;
    }
    let goals = home.checked_add(away)?;
    let predicted_total = goals.checked_mul(REGULATION_MINUTES)?.div_ceil(minute);
    let fast_tempo = goals > minute;
    let line = if fast_tempo {
        predicted_total.saturating_sub(OVER_MARGIN)
    } else {
        predicted_total.checked_add(UNDER_MARGIN)?
    };

    Some(TotalsProjection {
        goals,
        minute,
        predicted_total,
        fast_tempo,
        line,
    })
}

fn tempo_bonus(goals_per_minute: Decimal) -> Decimal {
    let deviation = (goals_per_minute - Decimal::ONE).abs();
    if deviation >= dec!(0.40) {
        dec!(0.10)
    } else if deviation >= dec!(0.20) {
        dec!(0.06)
    } else if deviation >= dec!(0.10) {
        dec!(0.03)
    } else {
        Decimal::ZERO
    }
}

/// Same buckets as the win heuristic: base, time and league quality, with the
/// tempo deviation in place of the lead.
pub fn confidence(projection: &TotalsProjection, tier: LeagueTier) -> Decimal {
    (heuristic::BASE_CONFIDENCE
        + heuristic::time_bonus(Sport::Handball, projection.minute)
        + heuristic::league_bonus(tier)
        + tempo_bonus(projection.goals_per_minute()))
    .max(Decimal::ZERO)
    .min(heuristic::MAX_CONFIDENCE)
}

/// Totals recommendation for a live handball snapshot, before threshold gating.
pub fn recommend(snapshot: &MatchSnapshot) -> Option<Recommendation> {
    if snapshot.sport != Sport::Handball || !snapshot.has_teams() {
        return None;
    }
    if clock_finished(snapshot.sport, &snapshot.minute) {
        return None;
    }
    let score = parse_goals(&snapshot.score)?;
    let projection = project(score.home, score.away, parse_minute(&snapshot.minute))?;
    let confidence = confidence(&projection, league_tier(snapshot.sport, &snapshot.league));

    let (labels, tempo): (&[&str], &str) = if projection.fast_tempo {
        (&["over"], "fast")
    } else {
        (&["under"], "slow")
    };

    Some(Recommendation {
        snapshot: snapshot.clone(),
        kind: RecommendationKind::Total,
        value: projection.value(),
        confidence,
        rationale: format!(
            "{} goals after {} minutes, {tempo} tempo projects about {} in total.",
            projection.goals, projection.minute, projection.predicted_total
        ),
        coefficient: Some(coefficient::resolve(snapshot, labels, confidence)),
        decided_by: "totals".to_string(),
    })
}
