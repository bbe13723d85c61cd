pub mod eventcards;
pub mod http;
pub mod livetable;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{MatchSnapshot, Sport};

/// A live-score site that can be scraped for in-progress matches.
///
/// Sources are leaves: any failure (HTTP status, timeout, broken markup)
/// is logged and yields an empty list.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Identifier stamped into `MatchSnapshot::source`.
    fn id(&self) -> &str;

    /// Fetch and parse the live page for one sport.
    async fn fetch(&self, sport: Sport) -> Vec<MatchSnapshot>;
}

/// Identity of a match within one cycle.
pub type DedupKey = (Sport, String, String, String);

pub fn dedup_key(snapshot: &MatchSnapshot) -> DedupKey {
    (
        snapshot.sport,
        snapshot.team1.trim().to_lowercase(),
        snapshot.team2.trim().to_lowercase(),
        snapshot.score.trim().to_string(),
    )
}

/// Rank of a source in the priority list; unlisted sources rank last.
fn rank(priority: &[String], source: &str) -> usize {
    priority
        .iter()
        .position(|p| p == source)
        .unwrap_or(priority.len())
}

/// Drop duplicate snapshots, keeping the one from the higher-priority source.
///
/// First-seen order is preserved: a replaced snapshot keeps its slot.
pub fn dedupe(snapshots: Vec<MatchSnapshot>, priority: &[String]) -> Vec<MatchSnapshot> {
    let mut index: HashMap<DedupKey, usize> = HashMap::new();
    let mut out: Vec<MatchSnapshot> = Vec::with_capacity(snapshots.len());

    for snapshot in snapshots {
        let key = dedup_key(&snapshot);
        match index.get(&key) {
            Some(&slot) => {
                if rank(priority, &snapshot.source) < rank(priority, &out[slot].source) {
                    out[slot] = snapshot;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(snapshot);
            }
        }
    }

    out
}

/// Merges snapshots from every configured source.
pub struct SourceAggregator {
    sources: Vec<Box<dyn SnapshotSource>>,
    priority: Vec<String>,
}

impl SourceAggregator {
    pub fn new(sources: Vec<Box<dyn SnapshotSource>>, priority: Vec<String>) -> Self {
        Self { sources, priority }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Query every source sequentially, concatenate and dedupe.
    pub async fn collect(&self, sport: Sport) -> Vec<MatchSnapshot> {
        let mut all = Vec::new();

        for source in &self.sources {
            let snapshots = source.fetch(sport).await;
            tracing::info!(
                source = source.id(),
                sport = %sport,
                snapshots = snapshots.len(),
                "Source fetched"
            );
            all.extend(snapshots);
        }

        let fetched = all.len();
        let deduped = dedupe(all, &self.priority);
        if deduped.len() < fetched {
            tracing::debug!(
                sport = %sport,
                fetched,
                kept = deduped.len(),
                "Dropped duplicate snapshots"
            );
        }
        deduped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snap(team1: &str, team2: &str, score: &str, source: &str) -> MatchSnapshot {
        MatchSnapshot {
            sport: Sport::Football,
            team1: team1.into(),
            team2: team2.into(),
            score: score.into(),
            minute: "50".into(),
            league: String::new(),
            source: source.into(),
            url: String::new(),
            odds: BTreeMap::new(),
        }
    }

    fn priority() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    struct FixedSource {
        id: &'static str,
        snapshots: Vec<MatchSnapshot>,
    }

    #[async_trait]
    impl SnapshotSource for FixedSource {
        fn id(&self) -> &str {
            self.id
        }

        async fn fetch(&self, _sport: Sport) -> Vec<MatchSnapshot> {
            self.snapshots.clone()
        }
    }

    #[test]
    fn test_dedupe_prefers_higher_priority() {
        let out = dedupe(vec![snap("x", "y", "1:0", "b"), snap("X", "Y", "1:0", "a")], &priority());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "a");
        assert_eq!(out[0].team1, "X");
    }

    #[test]
    fn test_dedupe_keeps_first_on_equal_priority() {
        let out = dedupe(vec![snap("x", "y", "1:0", "a"), snap("x", "y", "1:0", "a")], &priority());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_dedupe_distinguishes_scores() {
        let out = dedupe(vec![snap("x", "y", "1:0", "a"), snap("x", "y", "2:0", "b")], &priority());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let input = vec![
            snap("x", "y", "1:0", "b"),
            snap("p", "q", "0:0", "unknown"),
            snap("x", "y", "1:0", "a"),
            snap("p", "q", "0:0", "b"),
            snap("m", "n", "3:1", "a"),
        ];
        let once = dedupe(input, &priority());
        let twice = dedupe(once.clone(), &priority());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
        assert_eq!(once[1].source, "b");
    }

    #[tokio::test]
    async fn test_collect_merges_sources() {
        let aggregator = SourceAggregator::new(
            vec![
                Box::new(FixedSource { id: "b", snapshots: vec![snap("x", "y", "1:0", "b")] }),
                Box::new(FixedSource { id: "a", snapshots: vec![snap("x", "y", "1:0", "a"), snap("m", "n", "1:0", "a")] }),
            ],
            priority(),
        );
        let out = aggregator.collect(Sport::Football).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "a");
    }

    #[tokio::test]
    async fn test_collect_all_empty() {
        let aggregator = SourceAggregator::new(
            vec![Box::new(FixedSource { id: "a", snapshots: vec![] })],
            priority(),
        );
        assert!(aggregator.collect(Sport::Tennis).await.is_empty());
    }
}
