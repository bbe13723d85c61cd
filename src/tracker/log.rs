//! The prediction log: one JSON array file, rewritten atomically under an
//! advisory lock. Entries are only ever added; after creation only the
//! outcome, final score and notes may be filled in.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Recommendation, RecommendationKind, Sport};
use crate::tracker::TrackerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Unknown,
    Win,
    Loss,
    Push,
}

impl Outcome {
    pub fn is_settled(self) -> bool {
        self != Self::Unknown
    }

    /// Parse an outcome a user may assert: win, loss or push.
    pub fn parse_settled(raw: &str) -> Result<Self, TrackerError> {
        match raw.parse::<Outcome>()? {
            Self::Unknown => Err(TrackerError::InvalidOutcome(raw.to_string())),
            settled => Ok(settled),
        }
    }
}

impl FromStr for Outcome {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" | "pending" => Ok(Self::Unknown),
            "win" | "won" | "w" => Ok(Self::Win),
            "loss" | "lose" | "lost" | "l" => Ok(Self::Loss),
            "push" | "void" | "refund" => Ok(Self::Push),
            _ => Err(TrackerError::InvalidOutcome(s.to_string())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Push => "push",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    /// UTC+3 wall clock at prediction time.
    pub timestamp: DateTime<FixedOffset>,
    /// `None` for manual entries whose sport could not be inferred.
    pub sport: Option<Sport>,
    pub team1: String,
    pub team2: String,
    pub score: String,
    pub minute: String,
    pub league: String,
    #[serde(default)]
    pub kind: Option<RecommendationKind>,
    pub recommendation: String,
    pub confidence: Option<Decimal>,
    pub rationale: String,
    pub coefficient: Option<Decimal>,
    pub source: String,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub final_score: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PredictionLogEntry {
    pub fn from_recommendation(rec: &Recommendation, at: DateTime<FixedOffset>) -> Self {
        let s = &rec.snapshot;
        Self {
            timestamp: at,
            sport: Some(s.sport),
            team1: s.team1.clone(),
            team2: s.team2.clone(),
            score: s.score.clone(),
            minute: s.minute.clone(),
            league: s.league.clone(),
            kind: Some(rec.kind),
            recommendation: rec.value.clone(),
            confidence: Some(rec.confidence),
            rationale: rec.rationale.clone(),
            coefficient: rec.coefficient,
            source: s.source.clone(),
            outcome: Outcome::Unknown,
            final_score: None,
            notes: None,
        }
    }

    /// Calendar date in the log's own (UTC+3) offset.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn matches_teams(&self, team1: &str, team2: &str) -> bool {
        normalize(&self.team1) == normalize(team1) && normalize(&self.team2) == normalize(team2)
    }
}

fn normalize(team: &str) -> String {
    team.trim().to_lowercase()
}

pub struct PredictionLog {
    path: PathBuf,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// All entries in file order. A missing or empty file is an empty log.
    pub fn load(&self) -> Result<Vec<PredictionLogEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt prediction log: {}", self.path.display()))
    }

    /// Append a batch in one write.
    pub fn append(&self, batch: &[PredictionLogEntry]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.modify(|entries| {
            entries.extend_from_slice(batch);
            (batch.len(), true)
        })
    }

    /// Locked read-modify-write. The closure returns its result and whether
    /// the entries changed; unchanged logs are not rewritten.
    pub fn modify<R>(&self, f: impl FnOnce(&mut Vec<PredictionLogEntry>) -> (R, bool)) -> Result<R> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock
            .write()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

        let mut entries = self.load()?;
        let before = entries.len();
        let (result, changed) = f(&mut entries);
        debug_assert!(entries.len() >= before, "prediction log entries are never removed");

        if changed {
            self.write_atomic(&entries)?;
            debug!(path = %self.path.display(), entries = entries.len(), "Prediction log written");
        }
        Ok(result)
    }

    fn write_atomic(&self, entries: &[PredictionLogEntry]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(entries).context("Failed to serialize prediction log")?;
        fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }
}
