use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cycle budget exhausted at stage '{stage}' after {elapsed:?}")]
    Timeout { stage: String, elapsed: Duration },

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl CycleError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Wall-clock allowance for one analysis cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleBudget {
    started: Instant,
    limit: Duration,
}

impl CycleBudget {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Error if the budget is already spent before entering `stage`.
    pub fn check(&self, stage: &str) -> Result<(), CycleError> {
        if self.is_exhausted() {
            return Err(self.timeout(stage));
        }
        Ok(())
    }

    pub fn timeout(&self, stage: &str) -> CycleError {
        CycleError::Timeout {
            stage: stage.to_string(),
            elapsed: self.elapsed(),
        }
    }

    /// Run `stage` with whatever budget is left.
    pub async fn run<F: std::future::Future>(&self, stage: &str, fut: F) -> Result<F::Output, CycleError> {
        self.check(stage)?;
        tokio::time::timeout(self.remaining(), fut)
            .await
            .map_err(|_| self.timeout(stage))
    }
}
