//! Coefficient (decimal odds) attached to a recommendation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::analysis::features::Leader;
use crate::model::MatchSnapshot;

/// Synthesized odds for a confidence level when the source has no prices.
pub fn estimate(confidence: Decimal) -> Decimal {
    if confidence >= dec!(0.90) {
        dec!(1.25)
    } else if confidence >= dec!(0.85) {
        dec!(1.35)
    } else if confidence >= dec!(0.80) {
        dec!(1.55)
    } else if confidence >= dec!(0.75) {
        dec!(1.75)
    } else {
        dec!(1.95)
    }
}

/// Odds labels a source may use for the leading side's win.
pub fn win_labels(leader: Leader) -> &'static [&'static str] {
    match leader {
        Leader::Home => &["1", "home"],
        Leader::Away => &["2", "away"],
        Leader::None => &[],
    }
}

/// Real odds when the snapshot carries them, else the confidence table.
pub fn resolve(snapshot: &MatchSnapshot, labels: &[&str], confidence: Decimal) -> Decimal {
    snapshot
        .odds_for(labels)
        .unwrap_or_else(|| estimate(confidence))
}
