//! One analysis cycle: collect, filter, decide, publish, record.

use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agent::budget::{CycleBudget, CycleError};
use crate::analysis::{eligibility, features};
use crate::config::{AppConfig, Secrets};
use crate::data::eventcards::EventCardsSource;
use crate::data::http::PageFetcher;
use crate::data::livetable::LiveTableSource;
use crate::data::{SnapshotSource, SourceAggregator};
use crate::decision::{select_provider, totals, DecisionEngine, EngineSettings};
use crate::digest::{format_daily_stats, format_digest_within};
use crate::model::clock::now_local;
use crate::model::{MatchSnapshot, Recommendation, Sport};
use crate::monitoring::publisher::Publisher;
use crate::tracker::stats::DailyStats;
use crate::tracker::OutcomeTracker;

/// Counters for one cycle, logged as a single event.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub snapshots: usize,
    pub eligible: usize,
    pub win_picks: usize,
    pub total_picks: usize,
    pub recommendations: usize,
    pub published: bool,
    pub logged: usize,
    pub duration: Duration,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            snapshots: 0,
            eligible: 0,
            win_picks: 0,
            total_picks: 0,
            recommendations: 0,
            published: false,
            logged: 0,
            duration: Duration::ZERO,
        }
    }
}

pub struct Pipeline {
    aggregator: SourceAggregator,
    engine: DecisionEngine,
    tracker: OutcomeTracker,
    publisher: Publisher,
    cycle_budget: Duration,
}

impl Pipeline {
    pub fn new(
        aggregator: SourceAggregator,
        engine: DecisionEngine,
        tracker: OutcomeTracker,
        publisher: Publisher,
        cycle_budget: Duration,
    ) -> Self {
        Self {
            aggregator,
            engine,
            tracker,
            publisher,
            cycle_budget,
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: &AppConfig, secrets: &Secrets) -> Self {
        let fetcher = PageFetcher::new(
            &config.sources.user_agent,
            Duration::from_secs(config.sources.timeout_seconds),
        );

        let mut sources: Vec<Box<dyn SnapshotSource>> = Vec::new();
        if config.sources.livetable.enabled {
            sources.push(Box::new(LiveTableSource::new(
                fetcher.clone(),
                config.sources.livetable.sport_urls(),
            )));
        }
        if config.sources.eventcards.enabled {
            sources.push(Box::new(EventCardsSource::new(
                fetcher,
                config.sources.eventcards.sport_urls(),
            )));
        }
        if sources.is_empty() {
            warn!("No snapshot sources enabled — every digest will be empty");
        }

        let aggregator = SourceAggregator::new(sources, config.sources.priority.clone());
        let engine = DecisionEngine::new(
            select_provider(&config.decision, secrets),
            EngineSettings::from(&config.decision),
        );
        let tracker = OutcomeTracker::from_config(&config.tracker);
        let publisher = Publisher::from_config(&config.publisher, secrets);

        info!(
            sources = aggregator.source_count(),
            provider = engine.provider_name().unwrap_or("heuristic"),
            publishing = publisher.is_enabled(),
            "Pipeline initialized"
        );

        Self::new(aggregator, engine, tracker, publisher, config.scheduler.cycle_budget())
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    /// Run one cycle under the wall-clock budget.
    ///
    /// On timeout nothing is published or logged. A failed publish still
    /// records the recommendations.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let budget = CycleBudget::start(self.cycle_budget);
        let mut report = CycleReport::new();
        let cycle_id = report.cycle_id;
        info!(%cycle_id, "Starting cycle");

        let mut recommendations: Vec<Recommendation> = Vec::new();
        for sport in Sport::ALL {
            let picks = budget
                .run(sport.as_str(), self.process_sport(sport, &mut report))
                .await
                .inspect_err(|e| warn!(%cycle_id, error = %e, "Cycle aborted"))?;
            recommendations.extend(picks);
        }
        report.recommendations = recommendations.len();

        budget.check("publish")?;
        let digest = format_digest_within(&recommendations, now_local(), self.publisher.max_message_len());
        report.published = self.publisher.send_digest(&digest).await;
        if !report.published {
            warn!(%cycle_id, "Digest not published");
        }

        if !recommendations.is_empty() {
            report.logged = self
                .tracker
                .log_all(&recommendations)
                .context("Failed to record predictions")?;
        }

        report.duration = budget.elapsed();
        info!(
            %cycle_id,
            snapshots = report.snapshots,
            eligible = report.eligible,
            win_picks = report.win_picks,
            total_picks = report.total_picks,
            recommendations = report.recommendations,
            published = report.published,
            logged = report.logged,
            duration_ms = report.duration.as_millis() as u64,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn process_sport(&mut self, sport: Sport, report: &mut CycleReport) -> Vec<Recommendation> {
        let snapshots = self.aggregator.collect(sport).await;
        report.snapshots += snapshots.len();

        let mut picks = Vec::new();
        for snapshot in &snapshots {
            match eligibility::check(snapshot) {
                Ok(()) => {
                    if let Some(features) = features::extract(snapshot) {
                        report.eligible += 1;
                        if let Some(rec) = self.engine.decide(snapshot, &features).await {
                            report.win_picks += 1;
                            picks.push(rec);
                        }
                    }
                }
                Err(reason) => {
                    debug!(sport = %sport, home = %snapshot.team1, away = %snapshot.team2, %reason, "Snapshot rejected");
                }
            }

            if sport == Sport::Handball {
                if let Some(rec) = gated_total(snapshot) {
                    report.total_picks += 1;
                    picks.push(rec);
                }
            }
        }

        info!(sport = %sport, snapshots = snapshots.len(), picks = picks.len(), "Sport processed");
        picks
    }

    /// Compute, persist and publish today's stats.
    #[instrument(skip(self))]
    pub async fn run_daily_stats(&self) -> anyhow::Result<DailyStats> {
        let stats = self.tracker.daily_stats()?;
        if !self.publisher.send_daily_stats(&format_daily_stats(&stats)).await {
            error!(date = %stats.date, "Daily stats not published");
        }
        Ok(stats)
    }
}

/// Handball totals pass the same threshold as win picks.
fn gated_total(snapshot: &MatchSnapshot) -> Option<Recommendation> {
    let rec = totals::recommend(snapshot)?;
    let threshold: Decimal = Sport::Handball.threshold();
    if rec.confidence < threshold {
        debug!(value = %rec.value, confidence = %rec.confidence, "Total below threshold");
        return None;
    }
    Some(rec)
}
