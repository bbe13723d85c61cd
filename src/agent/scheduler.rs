//! Minute-tick loop driving the analysis cycle and the daily stats job.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use tokio::signal;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::agent::budget::CycleError;
use crate::agent::pipeline::Pipeline;
use crate::config::SchedulerConfig;
use crate::model::clock::now_local;
use crate::monitoring::watchdog::{Heartbeat, Watchdog};

/// A cycle is due on the first tick and then every `interval` since the
/// previous cycle started.
pub fn is_cycle_due(last_started: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_started {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

/// Daily stats run once per local day, on the first tick at or after `at`.
pub fn is_stats_due(now: DateTime<FixedOffset>, at: NaiveTime, last_run: Option<NaiveDate>) -> bool {
    now.time() >= at && last_run != Some(now.date_naive())
}

pub struct Scheduler {
    pipeline: Pipeline,
    config: SchedulerConfig,
    stats_at: NaiveTime,
    heartbeat: Heartbeat,
    last_cycle: Option<Instant>,
    last_stats: Option<NaiveDate>,
    consecutive_failures: u32,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, config: SchedulerConfig, heartbeat: Heartbeat) -> Result<Self> {
        let stats_at = config.daily_stats_at()?;
        Ok(Self {
            pipeline,
            config,
            stats_at,
            heartbeat,
            last_cycle: None,
            last_stats: None,
            consecutive_failures: 0,
        })
    }

    /// Tick until `shutdown` resolves. Returns an error once more than
    /// `max_consecutive_failures` cycles in a row fail fatally.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>, watchdog: Option<Watchdog>) -> Result<()> {
        self.pipeline.publisher().health_check().await;
        self.pipeline.publisher().send_startup().await;
        info!(
            interval_min = self.config.cycle_interval_minutes,
            budget_s = self.config.cycle_budget_seconds,
            stats_at = %self.stats_at,
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                _ = ticker.tick() => {
                    self.heartbeat.beat();
                    if let Err(e) = self.on_tick().await {
                        break Err(e);
                    }
                    self.heartbeat.beat();
                }
            }
        };

        if let Some(watchdog) = watchdog {
            watchdog.stop();
        }
        self.pipeline.publisher().send_shutdown().await;
        info!("Scheduler stopped");
        outcome
    }

    async fn on_tick(&mut self) -> Result<()> {
        let now = Instant::now();
        if is_cycle_due(self.last_cycle, now, self.config.cycle_interval()) {
            self.last_cycle = Some(now);
            self.run_cycle().await?;
        }

        let local = now_local();
        if is_stats_due(local, self.stats_at, self.last_stats) {
            self.last_stats = Some(local.date_naive());
            if let Err(e) = self.pipeline.run_daily_stats().await {
                error!(error = ?e, "Daily stats job failed");
            }
        }
        Ok(())
    }

    /// One cycle with failure accounting. Timeouts are logged and skipped.
    pub async fn run_cycle(&mut self) -> Result<()> {
        match self.pipeline.run_cycle().await {
            Ok(_) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(e @ CycleError::Timeout { .. }) => {
                warn!(error = %e, "Cycle timed out — waiting for next tick");
                Ok(())
            }
            Err(CycleError::Fatal(e)) => {
                self.consecutive_failures += 1;
                error!(
                    error = ?e,
                    consecutive = self.consecutive_failures,
                    "Cycle failed"
                );
                self.pipeline.publisher().send_error(&format!("{e:#}")).await;

                if self.consecutive_failures > self.config.max_consecutive_failures {
                    bail!(
                        "{} consecutive cycles failed; last error: {e:#}",
                        self.consecutive_failures
                    );
                }
                Ok(())
            }
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock::local_offset;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn test_cycle_due() {
        let interval = Duration::from_secs(45 * 60);
        let start = Instant::now();
        assert!(is_cycle_due(None, start, interval));

        tokio::time::advance(Duration::from_secs(44 * 60)).await;
        assert!(!is_cycle_due(Some(start), Instant::now(), interval));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(is_cycle_due(Some(start), Instant::now(), interval));
    }

    #[test]
    fn test_stats_due_once_per_day() {
        let at = NaiveTime::from_hms_opt(23, 50, 0).unwrap();
        let before = local_offset().with_ymd_and_hms(2026, 10, 19, 23, 49, 0).unwrap();
        let after = local_offset().with_ymd_and_hms(2026, 10, 19, 23, 50, 30).unwrap();
        let next_day = local_offset().with_ymd_and_hms(2026, 10, 20, 23, 51, 0).unwrap();

        assert!(!is_stats_due(before, at, None));
        assert!(is_stats_due(after, at, None));
        assert!(!is_stats_due(after, at, Some(after.date_naive())));
        assert!(is_stats_due(next_day, at, Some(after.date_naive())));
    }
}
