//! Liveness and resource monitor.
//!
//! Runs on its own OS thread so that a stalled cycle on the scheduler's
//! runtime is still noticed. It only reads the heartbeat and system
//! counters; every finding is a log line.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;

/// Unix timestamp of the last sign of life from the scheduler.
#[derive(Debug, Clone)]
pub struct Heartbeat(Arc<AtomicI64>);

impl Heartbeat {
    pub fn new() -> Self {
        let heartbeat = Self(Arc::new(AtomicI64::new(0)));
        heartbeat.beat();
        heartbeat
    }

    pub fn beat(&self) {
        self.0.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Seconds since the last beat.
    pub fn age_seconds(&self, now: i64) -> i64 {
        (now - self.last()).max(0)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative CPU jiffies from the aggregate `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

/// Used memory as a percentage of `MemTotal`, from `/proc/meminfo` text.
pub fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|v| v.parse().ok())
    };

    let total = field("MemTotal")?;
    if total == 0 {
        return None;
    }
    let available = field("MemAvailable").or_else(|| {
        Some(field("MemFree")? + field("Buffers").unwrap_or(0) + field("Cached").unwrap_or(0))
    })?;

    let used = total.saturating_sub(available);
    Some(used as f64 * 100.0 / total as f64)
}

pub fn parse_cpu_times(text: &str) -> Option<CpuTimes> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }

    // user nice system idle iowait irq softirq steal ...
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().take(8).sum();
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// CPU utilisation between two samples, in percent.
pub fn cpu_percent(previous: CpuTimes, current: CpuTimes) -> Option<f64> {
    let total = current.total.checked_sub(previous.total)?;
    if total == 0 {
        return None;
    }
    let busy = current.busy.saturating_sub(previous.busy);
    Some(busy as f64 * 100.0 / total as f64)
}

#[cfg(unix)]
fn disk_percent(path: &str) -> Result<f64> {
    let stat = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("statvfs failed for {path}"))?;
    let fragment = stat.fragment_size() as f64;
    let total = stat.blocks() as f64 * fragment;
    if total <= 0.0 {
        anyhow::bail!("filesystem at {path} reports zero size");
    }
    let free = stat.blocks_free() as f64 * fragment;
    Ok((total - free) * 100.0 / total)
}

#[cfg(not(unix))]
fn disk_percent(_path: &str) -> Result<f64> {
    anyhow::bail!("disk usage is only sampled on unix")
}

fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Threshold checks, separated from the thread so they can be driven directly.
pub struct Monitor {
    config: WatchdogConfig,
    heartbeat: Heartbeat,
    last_cpu: Option<CpuTimes>,
    hot_cpu_samples: u32,
}

/// Which checks fired on one pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CheckReport {
    pub heartbeat_stale: bool,
    pub memory_high: bool,
    pub cpu_high: bool,
    pub disk_high: bool,
}

impl Monitor {
    pub fn new(config: WatchdogConfig, heartbeat: Heartbeat) -> Self {
        Self {
            config,
            heartbeat,
            last_cpu: None,
            hot_cpu_samples: 0,
        }
    }

    pub fn check_heartbeat(&self, now: i64) -> bool {
        let age = self.heartbeat.age_seconds(now);
        let stale = age > self.config.heartbeat_stale_seconds as i64;
        if stale {
            warn!(age_s = age, limit_s = self.config.heartbeat_stale_seconds, "Scheduler heartbeat is stale");
        }
        stale
    }

    pub fn check_memory(&self, used_pct: f64) -> bool {
        let high = used_pct > self.config.memory_pct;
        if high {
            warn!(used_pct = format!("{used_pct:.1}"), limit_pct = self.config.memory_pct, "Memory usage high");
        }
        high
    }

    /// Warn only once utilisation stays above the limit for the configured
    /// number of consecutive samples.
    pub fn check_cpu(&mut self, sample: CpuTimes) -> bool {
        let previous = self.last_cpu.replace(sample);
        let Some(pct) = previous.and_then(|p| cpu_percent(p, sample)) else {
            return false;
        };

        if pct > self.config.cpu_pct {
            self.hot_cpu_samples += 1;
        } else {
            self.hot_cpu_samples = 0;
        }

        let sustained = self.hot_cpu_samples >= self.config.cpu_sustained_samples.max(1);
        if sustained {
            warn!(
                cpu_pct = format!("{pct:.1}"),
                samples = self.hot_cpu_samples,
                limit_pct = self.config.cpu_pct,
                "CPU usage sustained above limit"
            );
        }
        sustained
    }

    pub fn check_disk(&self, used_pct: f64) -> bool {
        let high = used_pct > self.config.disk_pct;
        if high {
            warn!(
                used_pct = format!("{used_pct:.1}"),
                limit_pct = self.config.disk_pct,
                path = %self.config.disk_path,
                "Disk usage high"
            );
        }
        high
    }

    /// One pass over every check, sampling the live system.
    pub fn run_checks(&mut self) -> CheckReport {
        let mut report = CheckReport {
            heartbeat_stale: self.check_heartbeat(Utc::now().timestamp()),
            ..Default::default()
        };

        if let Some(pct) = read_proc("/proc/meminfo").as_deref().and_then(parse_meminfo) {
            report.memory_high = self.check_memory(pct);
        }
        if let Some(sample) = read_proc("/proc/stat").as_deref().and_then(parse_cpu_times) {
            report.cpu_high = self.check_cpu(sample);
        }
        match disk_percent(&self.config.disk_path) {
            Ok(pct) => report.disk_high = self.check_disk(pct),
            Err(e) => debug!(error = %e, "Disk usage unavailable"),
        }

        report
    }
}

/// Handle to the running monitor thread.
pub struct Watchdog {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn(config: WatchdogConfig, heartbeat: Heartbeat) -> Result<Self> {
        let interval = Duration::from_secs(config.check_interval_seconds.max(1));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let mut monitor = Monitor::new(config, heartbeat);

        let handle = std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                info!(interval_s = interval.as_secs(), "Watchdog started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = monitor.run_checks();
                            debug!(?report, "Watchdog check");
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Watchdog stopped");
            })
            .context("Failed to spawn watchdog thread")?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            check_interval_seconds: 60,
            heartbeat_stale_seconds: 600,
            memory_pct: 80.0,
            cpu_pct: 90.0,
            cpu_sustained_samples: 2,
            disk_pct: 90.0,
            disk_path: ".".into(),
        }
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        let pct = parse_meminfo(text).unwrap();
        assert!((pct - 75.0).abs() < 1e-9);

        let no_available = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 50 kB\n";
        assert!((parse_meminfo(no_available).unwrap() - 80.0).abs() < 1e-9);
        assert!(parse_meminfo("garbage").is_none());
    }

    #[test]
    fn test_parse_cpu_times_and_percent() {
        let a = parse_cpu_times("cpu  100 0 100 800 0 0 0 0 0 0\ncpu0 1 2 3 4\n").unwrap();
        assert_eq!(a, CpuTimes { busy: 200, total: 1000 });
        let b = parse_cpu_times("cpu  190 0 100 810 0 0 0 0\n").unwrap();
        assert!((cpu_percent(a, b).unwrap() - 90.0).abs() < 1e-9);
        assert!(cpu_percent(a, a).is_none());
        assert!(parse_cpu_times("intr 1 2 3").is_none());
    }

    #[test]
    fn test_stale_heartbeat() {
        let heartbeat = Heartbeat::new();
        let monitor = Monitor::new(config(), heartbeat.clone());
        let now = heartbeat.last();
        assert!(!monitor.check_heartbeat(now + 600));
        assert!(monitor.check_heartbeat(now + 601));
    }

    #[test]
    fn test_cpu_must_be_sustained() {
        let mut monitor = Monitor::new(config(), Heartbeat::new());
        let mut busy = 0;
        let mut total = 0;
        let mut step = |monitor: &mut Monitor, busy_delta: u64| {
            busy += busy_delta;
            total += 100;
            monitor.check_cpu(CpuTimes { busy, total })
        };

        assert!(!step(&mut monitor, 95)); // first sample only primes
        assert!(!step(&mut monitor, 95));
        assert!(step(&mut monitor, 95));
        assert!(!step(&mut monitor, 10));
    }

    #[test]
    fn test_memory_and_disk_thresholds() {
        let monitor = Monitor::new(config(), Heartbeat::new());
        assert!(!monitor.check_memory(80.0));
        assert!(monitor.check_memory(80.1));
        assert!(!monitor.check_disk(90.0));
        assert!(monitor.check_disk(95.5));
    }

    #[test]
    fn test_watchdog_stops_promptly() {
        let watchdog = Watchdog::spawn(config(), Heartbeat::new()).unwrap();
        let started = std::time::Instant::now();
        watchdog.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
