//! Outcome tracking: prediction logging, manual reconciliation, daily stats.

pub mod log;
pub mod stats;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::TrackerConfig;
use crate::model::clock::{now_local, today_local};
use crate::model::Recommendation;
use crate::tracker::log::{Outcome, PredictionLog, PredictionLogEntry};
use crate::tracker::stats::DailyStats;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid outcome '{0}': expected win, loss or push")]
    InvalidOutcome(String),

    #[error("team names must not be empty")]
    EmptyTeam,

    #[error("recommendation must not be empty")]
    EmptyRecommendation,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl TrackerError {
    /// Caused by user input rather than storage.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

pub struct OutcomeTracker {
    log: PredictionLog,
    stats_path: PathBuf,
    history_dir: PathBuf,
}

impl OutcomeTracker {
    pub fn new(log_path: impl Into<PathBuf>, stats_path: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            log: PredictionLog::new(log_path),
            stats_path: stats_path.into(),
            history_dir: history_dir.into(),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            &config.prediction_log_path,
            &config.stats_path,
            &config.stats_history_dir,
        )
    }

    pub fn entries(&self) -> Result<Vec<PredictionLogEntry>> {
        self.log.load()
    }

    pub fn log(&self, recommendation: &Recommendation) -> Result<()> {
        self.log_all(std::slice::from_ref(recommendation)).map(|_| ())
    }

    /// Append every recommendation, in order, as one write.
    #[instrument(skip(self, recommendations), fields(count = recommendations.len()))]
    pub fn log_all(&self, recommendations: &[Recommendation]) -> Result<usize> {
        let at = now_local();
        let batch: Vec<PredictionLogEntry> = recommendations
            .iter()
            .map(|rec| PredictionLogEntry::from_recommendation(rec, at))
            .collect();
        let written = self.log.append(&batch)?;
        info!(written, "Predictions logged");
        Ok(written)
    }

    /// Settle the first still-unknown entry for these teams on `date`.
    /// Returns `false` when nothing matched.
    pub fn update(
        &self,
        team1: &str,
        team2: &str,
        date: NaiveDate,
        outcome: Outcome,
        final_score: Option<String>,
        notes: Option<String>,
    ) -> Result<bool, TrackerError> {
        if !outcome.is_settled() {
            return Err(TrackerError::InvalidOutcome(outcome.to_string()));
        }
        validate_teams(team1, team2)?;

        let updated = self.log.modify(|entries| {
            let target = entries.iter_mut().find(|e| {
                e.matches_teams(team1, team2) && e.local_date() == date && !e.outcome.is_settled()
            });
            match target {
                Some(entry) => {
                    entry.outcome = outcome;
                    entry.final_score = final_score;
                    entry.notes = notes;
                    (true, true)
                }
                None => (false, false),
            }
        })?;

        if updated {
            info!(team1, team2, %date, %outcome, "Prediction settled");
        } else {
            warn!(team1, team2, %date, "No open prediction matched — nothing updated");
        }
        Ok(updated)
    }

    /// Append a user-asserted result. The sport is taken from the most recent
    /// logged prediction for the same teams, when there is one.
    pub fn add_manual(
        &self,
        team1: &str,
        team2: &str,
        recommendation: &str,
        outcome: Outcome,
        notes: Option<String>,
    ) -> Result<PredictionLogEntry, TrackerError> {
        validate_teams(team1, team2)?;
        if recommendation.trim().is_empty() {
            return Err(TrackerError::EmptyRecommendation);
        }
        if !outcome.is_settled() {
            return Err(TrackerError::InvalidOutcome(outcome.to_string()));
        }

        let entry = self.log.modify(|entries| {
            let sport = entries
                .iter()
                .rev()
                .find(|e| e.matches_teams(team1, team2))
                .and_then(|e| e.sport);

            let entry = PredictionLogEntry {
                timestamp: now_local(),
                sport,
                team1: team1.trim().to_string(),
                team2: team2.trim().to_string(),
                score: String::new(),
                minute: String::new(),
                league: String::new(),
                kind: None,
                recommendation: recommendation.trim().to_string(),
                confidence: None,
                rationale: "manual result".to_string(),
                coefficient: None,
                source: "manual".to_string(),
                outcome,
                final_score: None,
                notes,
            };
            entries.push(entry.clone());
            (entry, true)
        })?;

        info!(team1, team2, %outcome, "Manual result added");
        Ok(entry)
    }

    /// Stats for today (UTC+3), persisted.
    pub fn daily_stats(&self) -> Result<DailyStats> {
        self.stats_for(today_local())
    }

    pub fn stats_for(&self, date: NaiveDate) -> Result<DailyStats> {
        let entries = self.log.load()?;
        let stats = stats::compute(&entries, date, now_local());
        stats::write_stats(&stats, &self.stats_path, &self.history_dir)?;
        info!(
            %date,
            total = stats.counts.total,
            wins = stats.counts.wins,
            losses = stats.counts.losses,
            "Daily stats computed"
        );
        Ok(stats)
    }
}

fn validate_teams(team1: &str, team2: &str) -> Result<(), TrackerError> {
    if team1.trim().is_empty() || team2.trim().is_empty() {
        return Err(TrackerError::EmptyTeam);
    }
    Ok(())
}
