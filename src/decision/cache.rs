//! In-memory memoization of decisions, including negative ones.

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::model::{MatchSnapshot, Recommendation};

struct CacheEntry {
    decision: Option<Recommendation>,
    inserted_at: Instant,
}

pub struct DecisionCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

/// SHA-256 over `sport|team1|team2|score|minute`, hex encoded.
pub fn cache_key(snapshot: &MatchSnapshot) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}",
        snapshot.sport,
        snapshot.team1.trim(),
        snapshot.team2.trim(),
        snapshot.score.trim(),
        snapshot.minute.trim()
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// `Some(decision)` on a fresh hit. Expired entries are evicted here.
    pub fn get(&mut self, key: &str) -> Option<Option<Recommendation>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.decision.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Insert and drop every expired entry, so keys never read again
    /// do not accumulate.
    pub fn insert(&mut self, key: String, decision: Option<Recommendation>) {
        self.prune_expired();
        self.entries.insert(
            key,
            CacheEntry {
                decision,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
