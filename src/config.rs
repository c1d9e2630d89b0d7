//! `.reportdesk.toml` loading, validation and CLI overrides.
//!
//! Every field has a default, so an empty or partial file is valid.

use crate::classification::{default_areas, AreaMapping};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".reportdesk.toml";

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Report table settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Snapshot settings.
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Job cadence and retry settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Category to responsible-area contact. Must contain `other`.
    #[serde(default = "default_areas")]
    pub areas: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            store: StoreConfig::default(),
            notifications: NotificationConfig::default(),
            snapshots: SnapshotConfig::default(),
            schedule: ScheduleConfig::default(),
            areas: default_areas(),
        }
    }
}

/// Pipeline-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of reports classified concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Debug logging without `--verbose`.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            verbose: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Report table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the JSON report table.
    #[serde(default = "default_reports_path")]
    pub reports_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reports_path: default_reports_path(),
        }
    }
}

fn default_reports_path() -> String {
    "reports.json".to_string()
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Channel (topic) classification notifications are published to.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// HTTP endpoint receiving notifications. Logged only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            endpoint: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_channel() -> String {
    "incident-notifications".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Root directory of the snapshot store.
    #[serde(default = "default_snapshot_root")]
    pub root: String,

    /// Path prefix inside the store.
    #[serde(default = "default_snapshot_prefix")]
    pub prefix: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: default_snapshot_root(),
            prefix: default_snapshot_prefix(),
        }
    }
}

fn default_snapshot_root() -> String {
    "snapshots".to_string()
}

fn default_snapshot_prefix() -> String {
    "stats".to_string()
}

/// Job cadence and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between classification runs.
    #[serde(default = "default_classify_interval")]
    pub classify_interval_seconds: u64,

    /// Local hour of the daily statistics run.
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,

    /// Weekday of the weekly statistics run (`mon`, `tuesday`, ...).
    #[serde(default = "default_weekly_weekday")]
    pub weekly_weekday: String,

    /// Local hour of the weekly statistics run.
    #[serde(default = "default_weekly_hour")]
    pub weekly_hour: u32,

    /// Extra attempts after a failed classification run.
    #[serde(default = "default_classify_retries")]
    pub classify_retries: u32,

    /// Extra attempts after a failed statistics run.
    #[serde(default = "default_aggregation_retries")]
    pub aggregation_retries: u32,

    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            classify_interval_seconds: default_classify_interval(),
            daily_hour: default_daily_hour(),
            weekly_weekday: default_weekly_weekday(),
            weekly_hour: default_weekly_hour(),
            classify_retries: default_classify_retries(),
            aggregation_retries: default_aggregation_retries(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

fn default_classify_interval() -> u64 {
    300
}

fn default_daily_hour() -> u32 {
    8
}

fn default_weekly_weekday() -> String {
    "mon".to_string()
}

fn default_weekly_hour() -> u32 {
    9
}

fn default_classify_retries() -> u32 {
    2
}

fn default_aggregation_retries() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    300
}

impl ScheduleConfig {
    pub fn classify_interval(&self) -> Duration {
        Duration::from_secs(self.classify_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn weekday(&self) -> Result<Weekday, ConfigError> {
        self.weekly_weekday.parse::<Weekday>().map_err(|_| {
            ConfigError::invalid(
                "schedule.weekly_weekday",
                format!("'{}' is not a weekday", self.weekly_weekday),
            )
        })
    }
}

impl Config {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads `.reportdesk.toml` from the working directory, if present.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.concurrency == 0 {
            return Err(ConfigError::invalid(
                "general.concurrency",
                "must be at least 1",
            ));
        }
        if self.store.reports_path.trim().is_empty() {
            return Err(ConfigError::invalid("store.reports_path", "must not be empty"));
        }
        if self.notifications.channel.trim().is_empty() {
            return Err(ConfigError::invalid(
                "notifications.channel",
                "must not be empty",
            ));
        }
        if let Some(ref endpoint) = self.notifications.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::invalid(
                    "notifications.endpoint",
                    "must start with 'http://' or 'https://'",
                ));
            }
        }
        if self.schedule.classify_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "schedule.classify_interval_seconds",
                "must be at least 1",
            ));
        }
        for (field, hour) in [
            ("schedule.daily_hour", self.schedule.daily_hour),
            ("schedule.weekly_hour", self.schedule.weekly_hour),
        ] {
            if hour > 23 {
                return Err(ConfigError::invalid(field, "must be between 0 and 23"));
            }
        }
        self.schedule.weekday()?;
        self.area_mapping()?;

        Ok(())
    }

    /// The configured area table as a validated mapping.
    pub fn area_mapping(&self) -> Result<AreaMapping, ConfigError> {
        AreaMapping::new(self.areas.clone())
    }

    /// Applies explicitly given CLI values on top of the file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref reports) = args.reports {
            self.store.reports_path = reports.display().to_string();
        }
        if let Some(ref snapshots) = args.snapshots {
            self.snapshots.root = snapshots.display().to_string();
        }
        if let Some(ref endpoint) = args.endpoint {
            self.notifications.endpoint = Some(endpoint.clone());
        }
        if let Some(ref channel) = args.channel {
            self.notifications.channel = channel.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Default configuration rendered as TOML, for `--init-config`.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
