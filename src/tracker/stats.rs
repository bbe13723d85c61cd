//! Day-level aggregation over the prediction log.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::tracker::log::{Outcome, PredictionLogEntry};

/// Sport key used for manual entries without a known sport.
pub const OTHER_SPORT: &str = "other";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub unknown: u32,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Push => self.pushes += 1,
            Outcome::Unknown => self.unknown += 1,
        }
    }

    /// Entries with a known outcome.
    pub fn settled(&self) -> u32 {
        self.wins + self.losses + self.pushes
    }

    /// `wins / (wins + losses)`; pushes do not count. `None` without decided bets.
    pub fn win_rate(&self) -> Option<Decimal> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            return None;
        }
        Some((Decimal::from(self.wins) / Decimal::from(decided)).round_dp(4))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub known: u32,
    pub win_rate: Option<Decimal>,
    pub by_sport: BTreeMap<String, OutcomeCounts>,
    pub by_confidence: BTreeMap<String, OutcomeCounts>,
}

pub fn confidence_bucket(confidence: Option<Decimal>) -> &'static str {
    match confidence {
        None => "unrated",
        Some(c) if c >= dec!(0.90) => "0.90+",
        Some(c) if c >= dec!(0.85) => "0.85-0.89",
        Some(c) if c >= dec!(0.80) => "0.80-0.84",
        Some(c) if c >= dec!(0.75) => "0.75-0.79",
        Some(_) => "<0.75",
    }
}

/// Aggregate the entries dated `date` (UTC+3).
pub fn compute(entries: &[PredictionLogEntry], date: NaiveDate, generated_at: DateTime<FixedOffset>) -> DailyStats {
    let mut counts = OutcomeCounts::default();
    let mut by_sport: BTreeMap<String, OutcomeCounts> = BTreeMap::new();
    let mut by_confidence: BTreeMap<String, OutcomeCounts> = BTreeMap::new();

    for entry in entries.iter().filter(|e| e.local_date() == date) {
        counts.record(entry.outcome);

        let sport = entry
            .sport
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| OTHER_SPORT.to_string());
        by_sport.entry(sport).or_default().record(entry.outcome);

        by_confidence
            .entry(confidence_bucket(entry.confidence).to_string())
            .or_default()
            .record(entry.outcome);
    }

    DailyStats {
        date,
        generated_at,
        known: counts.settled(),
        win_rate: counts.win_rate(),
        counts,
        by_sport,
        by_confidence,
    }
}

/// Overwrite the latest-stats file and the dated history snapshot.
pub fn write_stats(stats: &DailyStats, latest: &Path, history_dir: &Path) -> Result<()> {
    let body = serde_json::to_vec_pretty(stats).context("Failed to serialize daily stats")?;

    if let Some(parent) = latest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(latest, &body).with_context(|| format!("Failed to write {}", latest.display()))?;

    fs::create_dir_all(history_dir)
        .with_context(|| format!("Failed to create {}", history_dir.display()))?;
    let dated = history_dir.join(format!("stats_{}.json", stats.date.format("%Y-%m-%d")));
    fs::write(&dated, &body).with_context(|| format!("Failed to write {}", dated.display()))?;

    Ok(())
}
