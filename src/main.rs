use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use live_picks::agent::control::{self, PidFile, ProcessStatus};
use live_picks::agent::scheduler::{shutdown_signal, Scheduler};
use live_picks::agent::Pipeline;
use live_picks::config::AppConfig;
use live_picks::digest::format_daily_stats;
use live_picks::monitoring::logger;
use live_picks::monitoring::watchdog::{Heartbeat, Watchdog};
use live_picks::tracker::log::Outcome;
use live_picks::tracker::{OutcomeTracker, TrackerError};

const STOP_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "live-picks", version, about = "Live sports picks: scan, decide, publish, track")]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until SIGINT/SIGTERM.
    Start,
    /// Run exactly one analysis cycle.
    Single,
    /// Report whether an instance is running.
    Status,
    /// Stop the running instance.
    Stop,
    /// Stop the running instance and start a new one in the background.
    Restart,
    /// `<team1> <team2> <recommendation> <outcome> [notes]`, or `stats`.
    AddResult {
        #[arg(required = true, num_args = 1..=5)]
        args: Vec<String>,
    },
    /// Settle a logged prediction.
    UpdateResult {
        team1: String,
        team2: String,
        /// Local (UTC+3) date of the prediction, YYYY-MM-DD.
        date: NaiveDate,
        outcome: String,
        #[arg(long)]
        final_score: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "live-picks failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let (config, secrets) = AppConfig::load(&cli.config)?;
    let _log_guard = logger::init_logging(&config.monitoring)?;

    match cli.command {
        Command::Start => {
            let mut pid_file = PidFile::new(&config.control.pid_file)?;
            let _instance = pid_file.acquire()?;

            let heartbeat = Heartbeat::new();
            let watchdog = Watchdog::spawn(config.watchdog.clone(), heartbeat.clone())?;
            let pipeline = Pipeline::from_config(&config, &secrets);
            let scheduler = Scheduler::new(pipeline, config.scheduler.clone(), heartbeat)?;

            info!(config = %cli.config.display(), "live-picks starting");
            scheduler.run(shutdown_signal(), Some(watchdog)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Single => {
            let mut pipeline = Pipeline::from_config(&config, &secrets);
            match pipeline.run_cycle().await {
                Ok(report) => {
                    println!(
                        "cycle {}: {} snapshots, {} eligible, {} recommendations, published={}",
                        report.cycle_id, report.snapshots, report.eligible, report.recommendations, report.published
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_timeout() => {
                    warn!(error = %e, "Single cycle timed out");
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Status => {
            let pid_path = PathBuf::from(&config.control.pid_file);
            match control::status(&pid_path)? {
                ProcessStatus::Running(pid) => println!("running (pid {pid})"),
                ProcessStatus::Stale(pid) => println!("stopped (stale pid file for {pid})"),
                ProcessStatus::Stopped => println!("stopped"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Stop => {
            let pid_path = PathBuf::from(&config.control.pid_file);
            if control::stop(&pid_path, STOP_GRACE).await? {
                println!("stopped");
            } else {
                println!("not running");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Restart => {
            let pid_path = PathBuf::from(&config.control.pid_file);
            let pid = control::restart(&pid_path, &cli.config, STOP_GRACE).await?;
            println!("started (pid {pid})");
            Ok(ExitCode::SUCCESS)
        }
        Command::AddResult { args } => {
            let tracker = OutcomeTracker::from_config(&config.tracker);
            add_result(&tracker, &args)
        }
        Command::UpdateResult {
            team1,
            team2,
            date,
            outcome,
            final_score,
            notes,
        } => {
            let tracker = OutcomeTracker::from_config(&config.tracker);
            let result = Outcome::parse_settled(&outcome)
                .and_then(|outcome| tracker.update(&team1, &team2, date, outcome, final_score, notes));
            match result {
                Ok(true) => {
                    println!("updated: {team1} vs {team2} on {date} -> {outcome}");
                    Ok(ExitCode::SUCCESS)
                }
                Ok(false) => {
                    println!("no open prediction for {team1} vs {team2} on {date}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => validation_exit(e),
            }
        }
    }
}

fn add_result(tracker: &OutcomeTracker, args: &[String]) -> Result<ExitCode> {
    match args {
        [only] if only == "stats" => {
            let stats = tracker.daily_stats()?;
            println!("{}", format_daily_stats(&stats));
            Ok(ExitCode::SUCCESS)
        }
        [team1, team2, recommendation, outcome, rest @ ..] if rest.len() <= 1 => {
            let notes = rest.first().cloned();
            let result = Outcome::parse_settled(outcome)
                .and_then(|outcome| tracker.add_manual(team1, team2, recommendation, outcome, notes));
            match result {
                Ok(entry) => {
                    println!(
                        "added: {} vs {} | {} | {}",
                        entry.team1, entry.team2, entry.recommendation, entry.outcome
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => validation_exit(e),
            }
        }
        _ => {
            eprintln!("usage: add-result <team1> <team2> <recommendation> <outcome> [notes] | add-result stats");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Validation errors exit 1; storage errors propagate.
fn validation_exit(e: TrackerError) -> Result<ExitCode> {
    if e.is_validation() {
        eprintln!("error: {e}");
        Ok(ExitCode::FAILURE)
    } else {
        Err(e.into())
    }
}
