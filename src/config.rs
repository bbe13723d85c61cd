use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use secrecy::SecretString;
use serde::Deserialize;

use crate::model::Sport;

/// Configuration shipped with the binary; `config/default.toml` on disk overrides it.
const EMBEDDED_DEFAULTS: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    pub decision: DecisionConfig,
    pub publisher: PublisherConfig,
    pub tracker: TrackerConfig,
    pub watchdog: WatchdogConfig,
    pub monitoring: MonitoringConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    pub cycle_interval_minutes: u64,
    pub cycle_budget_seconds: u64,
    /// Local (UTC+3) wall-clock time of the daily stats job, `HH:MM`.
    pub daily_stats_time: String,
    pub max_consecutive_failures: u32,
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_minutes * 60)
    }

    pub fn cycle_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_budget_seconds)
    }

    pub fn daily_stats_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_stats_time, "%H:%M")
            .with_context(|| format!("Invalid daily_stats_time: {}", self.daily_stats_time))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub priority: Vec<String>,
    pub livetable: SiteConfig,
    pub eventcards: SiteConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub enabled: bool,
    /// Sport name (`football`, `tennis`, `table-tennis`, `handball`) to page URL.
    pub urls: BTreeMap<String, String>,
}

impl SiteConfig {
    /// Page URLs keyed by sport; unknown sport names are skipped.
    pub fn sport_urls(&self) -> BTreeMap<Sport, String> {
        self.urls
            .iter()
            .filter_map(|(name, url)| match Sport::from_str(name) {
                Ok(sport) => Some((sport, url.clone())),
                Err(_) => {
                    tracing::warn!(sport = %name, "Unknown sport in source URL table — ignoring");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    pub llm_enabled: bool,
    pub min_request_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_provider_failures: u32,
    pub openai_base_url: String,
    pub openai_model: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub ide_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub api_base_url: String,
    pub timeout_seconds: u64,
    pub max_message_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub prediction_log_path: String,
    pub stats_path: String,
    pub stats_history_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    pub check_interval_seconds: u64,
    pub heartbeat_stale_seconds: u64,
    pub memory_pct: f64,
    pub cpu_pct: f64,
    pub cpu_sustained_samples: u32,
    pub disk_pct: f64,
    pub disk_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub log_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    pub pid_file: String,
}

/// Runtime switches read from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enable_ide_assistant: bool,
    pub disable_openai: bool,
    pub disable_anthropic: bool,
    pub disable_llm: bool,
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
#[derive(Default)]
pub struct Secrets {
    pub telegram_bot_token: Option<SecretString>,
    pub telegram_channel: Option<String>,
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
    pub ide_assistant_url: Option<String>,
    pub ide_assistant_token: Option<SecretString>,
    pub flags: FeatureFlags,
}

impl Secrets {
    pub fn from_env() -> Self {
        let secret = |name: &str| non_empty_env(name).map(SecretString::from);
        Self {
            telegram_bot_token: secret("TELEGRAM_BOT_TOKEN"),
            telegram_channel: non_empty_env("TELEGRAM_CHANNEL"),
            openai_api_key: secret("OPENAI_API_KEY"),
            anthropic_api_key: secret("ANTHROPIC_API_KEY"),
            ide_assistant_url: non_empty_env("IDE_ASSISTANT_URL"),
            ide_assistant_token: secret("IDE_ASSISTANT_TOKEN"),
            flags: FeatureFlags {
                enable_ide_assistant: env_flag("ENABLE_IDE_ASSISTANT"),
                disable_openai: env_flag("DISABLE_OPENAI"),
                disable_anthropic: env_flag("DISABLE_ANTHROPIC"),
                disable_llm: env_flag("DISABLE_LLM"),
            },
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(name: &str) -> bool {
    non_empty_env(name).is_some_and(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl AppConfig {
    /// Load configuration from a TOML file, overlaying environment variables for secrets.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let config_path = path.as_ref();
        let config = if config_path.exists() {
            let contents = std::fs::read_to_string(config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            Self::from_toml_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::warn!(
                path = %config_path.display(),
                "Config file not found — using built-in defaults"
            );
            Self::defaults()?
        };

        Ok((config, Secrets::from_env()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid configuration")?;
        config.scheduler.daily_stats_at()?;
        Ok(config)
    }

    /// The configuration compiled into the binary.
    pub fn defaults() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_DEFAULTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let contents = std::fs::read_to_string("config/default.toml")
            .expect("config/default.toml should exist");
        let config = AppConfig::from_toml_str(&contents).expect("should parse");
        assert_eq!(config.scheduler.cycle_interval_minutes, 45);
        assert_eq!(config.scheduler.cycle_budget_seconds, 300);
        assert_eq!(config.decision.cache_ttl_seconds, 3600);
        assert_eq!(config.decision.max_attempts, 3);
        assert_eq!(config.sources.priority, vec!["livetable", "eventcards"]);
        assert_eq!(config.publisher.max_message_len, 4096);
    }

    #[test]
    fn test_scheduler_durations() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(config.scheduler.cycle_interval(), Duration::from_secs(45 * 60));
        assert_eq!(config.scheduler.cycle_budget(), Duration::from_secs(300));
        assert_eq!(
            config.scheduler.daily_stats_at().unwrap(),
            NaiveTime::from_hms_opt(23, 50, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_stats_time_rejected() {
        let contents = EMBEDDED_DEFAULTS.replace("\"23:50\"", "\"25:99\"");
        assert!(AppConfig::from_toml_str(&contents).is_err());
    }

    #[test]
    fn test_site_urls_keyed_by_sport() {
        let config = AppConfig::defaults().unwrap();
        let urls = config.sources.livetable.sport_urls();
        assert_eq!(urls.len(), 4);
        assert!(urls.contains_key(&Sport::TableTennis));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
