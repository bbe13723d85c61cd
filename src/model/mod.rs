//! Domain types shared by every stage of the pipeline.

pub mod clock;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Sports the pipeline analyses, in digest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sport {
    Football,
    Tennis,
    TableTennis,
    Handball,
}

impl Sport {
    pub const ALL: [Sport; 4] = [
        Sport::Football,
        Sport::Tennis,
        Sport::TableTennis,
        Sport::Handball,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Football => "football",
            Self::Tennis => "tennis",
            Self::TableTennis => "table-tennis",
            Self::Handball => "handball",
        }
    }

    /// Minimum confidence a recommendation needs to be published.
    pub fn threshold(self) -> Decimal {
        match self {
            Self::Football | Self::Handball => dec!(0.80),
            Self::Tennis | Self::TableTennis => dec!(0.75),
        }
    }

    /// Regulation match length in minutes for clocked sports.
    pub fn regulation_minutes(self) -> Option<u32> {
        match self {
            Self::Football => Some(90),
            Self::Handball => Some(60),
            Self::Tennis | Self::TableTennis => None,
        }
    }

    /// Minutes past regulation a clock may show before the match counts as finished.
    pub fn grace_minutes(self) -> u32 {
        5
    }

    /// Smallest lead (goals for clocked sports, sets for racket sports) the
    /// acceptance criteria allow.
    pub fn minimum_lead(self) -> u32 {
        match self {
            Self::Handball => 4,
            Self::Football | Self::Tennis | Self::TableTennis => 1,
        }
    }

    /// Minute window in which a clocked sport is considered for a win pick.
    pub fn acceptance_window(self) -> Option<(u32, u32)> {
        match self {
            Self::Football => Some((25, 75)),
            Self::Handball => Some((30, 60)),
            Self::Tennis | Self::TableTennis => None,
        }
    }

    pub fn is_clocked(self) -> bool {
        self.regulation_minutes().is_some()
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Football => "⚽",
            Self::Tennis => "🎾",
            Self::TableTennis => "🏓",
            Self::Handball => "🤾",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "football" | "soccer" => Ok(Self::Football),
            "tennis" => Ok(Self::Tennis),
            "table-tennis" | "table_tennis" | "tabletennis" | "table tennis" => {
                Ok(Self::TableTennis)
            }
            "handball" => Ok(Self::Handball),
            other => Err(format!("unknown sport: {other}")),
        }
    }
}

/// One observation of a live match, as scraped from a source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub sport: Sport,
    pub team1: String,
    pub team2: String,
    /// Sport-specific score text: `H:A` for football/handball, `sets` or
    /// `sets (games)` for racket sports.
    pub score: String,
    /// Raw match clock, e.g. `67'`, `45+2`, `2nd set`.
    pub minute: String,
    pub league: String,
    pub source: String,
    pub url: String,
    /// Decimal odds keyed by outcome label (`1`, `2`, `X`, `over`, `under`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub odds: BTreeMap<String, Decimal>,
}

impl MatchSnapshot {
    /// Both participants are present.
    pub fn has_teams(&self) -> bool {
        !self.team1.trim().is_empty() && !self.team2.trim().is_empty()
    }

    pub fn odds_for(&self, labels: &[&str]) -> Option<Decimal> {
        labels
            .iter()
            .find_map(|label| self.odds.get(*label).copied())
            .filter(|odds| *odds > Decimal::ONE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Win,
    Total,
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => f.write_str("win"),
            Self::Total => f.write_str("total"),
        }
    }
}

/// A snapshot promoted to a suggested bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub snapshot: MatchSnapshot,
    pub kind: RecommendationKind,
    /// Free text such as `П1`, `П2`, `Over 59`, `Victory of X`.
    pub value: String,
    pub confidence: Decimal,
    pub rationale: String,
    pub coefficient: Option<Decimal>,
    /// Which decision path produced this (`heuristic`, `totals`, or a provider name).
    pub decided_by: String,
}

impl Recommendation {
    pub fn sport(&self) -> Sport {
        self.snapshot.sport
    }

    /// Structural invariants every emitted recommendation must satisfy.
    pub fn is_valid(&self) -> bool {
        !self.value.trim().is_empty()
            && !self.rationale.trim().is_empty()
            && self.confidence >= self.sport().threshold()
            && self.confidence <= Decimal::ONE
    }
}
