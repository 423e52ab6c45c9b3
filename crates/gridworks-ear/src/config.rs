//! Configuration management for the Ear.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::universe::UniverseType;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "gridworks-ear";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "EAR_";

/// Shown in place of secrets.
const REDACTED: &str = "********";

/// Default journal file name.
const JOURNAL_FILE_NAME: &str = "journal.db";

/// Ear settings.
///
/// Settings are loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `EAR_`, nested with `__`)
/// 2. TOML config file at `~/.config/gridworks-ear/config.toml`
/// 3. Default values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarSettings {
    /// Alias of the ear's own GNode.
    pub g_node_alias: String,
    /// World instance this ear archives, e.g. `hw1__1`.
    pub world_instance_alias: String,
    /// Universe the ear runs in.
    pub universe_type: UniverseType,
    /// Fully qualified domain name of the host, stamped into file names.
    pub my_fqdn: String,
    /// Root of all local output.
    pub output_dir: PathBuf,
    /// Log a one-line summary of every message heard.
    pub log_message_summary: bool,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// GNodes whose messages the ear subscribes to.
    pub tracking: TrackingConfig,
    /// Object store for archived messages.
    pub store: StoreConfig,
    /// Slack alerting.
    pub slack: SlackConfig,
    /// Periodic job markers.
    pub cron: CronConfig,
    /// Local message journal.
    pub journal: JournalConfig,
    /// External liveness checks.
    pub watchdog: WatchdogConfig,
}

/// MQTT broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Broker username.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Fixed client id. A random one is generated when unset.
    pub client_id: Option<String>,
    /// Capacity of the internal message channel.
    pub channel_capacity: usize,
    /// Seconds to wait before retrying after a connection error.
    pub reconnect_delay_secs: u64,
}

/// The GNodes an ear listens to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Atomic transactive node aliases.
    pub atn_aliases: Vec<String>,
    /// SCADA aliases.
    pub scada_aliases: Vec<String>,
    /// Local sensor aliases publishing outside the `gw/` namespace.
    pub local_sensor_aliases: Vec<String>,
}

/// Which object store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Amazon S3 (or a compatible endpoint).
    #[default]
    S3,
    /// A local directory standing in for the bucket.
    Filesystem,
}

/// Object store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub kind: StoreKind,
    /// S3 bucket name.
    pub bucket_name: String,
    /// AWS region.
    pub region_name: String,
    /// Custom S3 endpoint (e.g. a local `MinIO`).
    pub endpoint_url: Option<String>,
    /// Root directory for the filesystem backend.
    /// Defaults to `<output_dir>/bucket`.
    pub root: Option<PathBuf>,
    /// Only roll over to a new daily folder once the current one holds more
    /// than this many bytes. Zero rolls over every day.
    pub rollover_min_bytes: u64,
}

/// Slack configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Incoming webhook URL. Empty disables alerts.
    pub web_hook_url: String,
}

/// Periodic job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Marker touched by the minute job. Defaults to `<output_dir>/cron_last_minute.txt`.
    pub minute_file: Option<PathBuf>,
    /// Marker touched by the hour job. Defaults to `<output_dir>/cron_last_hour.txt`.
    pub hour_file: Option<PathBuf>,
    /// Marker touched by the day job. Defaults to `<output_dir>/cron_last_day.txt`.
    pub day_file: Option<PathBuf>,
    /// A silent hour only raises a warning when the previous hour job ran at
    /// least this long ago.
    pub silence_warning_after_secs: u64,
}

/// Journal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Path to the journal database. Defaults to `<output_dir>/journal.db`.
    pub database_path: Option<PathBuf>,
    /// Maximum age of journal rows in days. Set to 0 for unlimited.
    pub max_age_days: u32,
}

/// Watchdog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// While this file exists, warnings are not sent.
    pub warning_silencer_file: PathBuf,
    /// Written when the ear has been reported dead.
    /// Defaults to `<output_dir>/watchdog_alarm.txt`.
    pub alarm_file: Option<PathBuf>,
    /// The ear is considered dead when the minute marker is older than this.
    pub dead_after_secs: u64,
}

impl Default for EarSettings {
    fn default() -> Self {
        Self {
            g_node_alias: "d1.ear".to_string(),
            world_instance_alias: "d1__1".to_string(),
            universe_type: UniverseType::Dev,
            my_fqdn: "d1-1.electricity.works".to_string(),
            output_dir: PathBuf::from("output"),
            log_message_summary: false,
            mqtt: MqttConfig::default(),
            tracking: TrackingConfig::default(),
            store: StoreConfig::default(),
            slack: SlackConfig::default(),
            cron: CronConfig::default(),
            journal: JournalConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
            client_id: None,
            channel_capacity: 1024,
            reconnect_delay_secs: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::S3,
            bucket_name: "gwdev".to_string(),
            region_name: "us-east-1".to_string(),
            endpoint_url: None,
            root: None,
            rollover_min_bytes: 0,
        }
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            minute_file: None,
            hour_file: None,
            day_file: None,
            silence_warning_after_secs: 1800,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_age_days: 30,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            warning_silencer_file: PathBuf::from("DO_NOT_SEND_SERVICE_WARNINGS.txt"),
            alarm_file: None,
            dead_after_secs: 300,
        }
    }
}

impl EarSettings {
    /// Load settings from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(EarSettings::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let settings: EarSettings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.my_fqdn.trim().is_empty() {
            return Err(Error::config("my_fqdn must not be empty"));
        }

        let instance_pattern = Regex::new(r"^[a-z][a-z0-9]*__[0-9]+$")
            .map_err(|e| Error::internal(format!("world instance pattern: {e}")))?;
        if !instance_pattern.is_match(&self.world_instance_alias) {
            return Err(Error::config(format!(
                "world_instance_alias '{}' must look like <world>__<n>",
                self.world_instance_alias
            )));
        }

        if self.mqtt.port == 0 {
            return Err(Error::config("mqtt.port must be greater than 0"));
        }

        if self.mqtt.channel_capacity == 0 {
            return Err(Error::config("mqtt.channel_capacity must be greater than 0"));
        }

        if self.watchdog.dead_after_secs == 0 {
            return Err(Error::config("watchdog.dead_after_secs must be greater than 0"));
        }

        if self.store.kind == StoreKind::S3 && self.store.bucket_name.trim().is_empty() {
            return Err(Error::config("store.bucket_name must be set for the s3 store"));
        }

        Ok(())
    }

    /// Directory holding messages that still need to be put in the store.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.output_dir
            .join("need_to_put")
            .join(&self.world_instance_alias)
    }

    /// Root directory of the filesystem store.
    #[must_use]
    pub fn store_root(&self) -> PathBuf {
        self.store
            .root
            .clone()
            .unwrap_or_else(|| self.output_dir.join("bucket"))
    }

    /// Marker file for the minute job.
    #[must_use]
    pub fn minute_cron_file(&self) -> PathBuf {
        self.cron
            .minute_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("cron_last_minute.txt"))
    }

    /// Marker file for the hour job.
    #[must_use]
    pub fn hour_cron_file(&self) -> PathBuf {
        self.cron
            .hour_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("cron_last_hour.txt"))
    }

    /// Marker file for the day job.
    #[must_use]
    pub fn day_cron_file(&self) -> PathBuf {
        self.cron
            .day_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("cron_last_day.txt"))
    }

    /// Get the journal path, resolving defaults if not set.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.journal
            .database_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(JOURNAL_FILE_NAME))
    }

    /// Get the watchdog alarm file, resolving defaults if not set.
    #[must_use]
    pub fn alarm_file(&self) -> PathBuf {
        self.watchdog
            .alarm_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("watchdog_alarm.txt"))
    }

    /// Get the journal max age as a Duration.
    #[must_use]
    pub fn journal_max_age(&self) -> Option<Duration> {
        if self.journal.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.journal.max_age_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Get the watchdog threshold as a Duration.
    #[must_use]
    pub fn dead_after(&self) -> Duration {
        Duration::from_secs(self.watchdog.dead_after_secs)
    }

    /// A copy safe to print, with the broker password and webhook masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if !settings.mqtt.password.is_empty() {
            settings.mqtt.password = REDACTED.to_string();
        }
        if !settings.slack.web_hook_url.is_empty() {
            settings.slack.web_hook_url = REDACTED.to_string();
        }
        settings
    }
}

impl MqttConfig {
    /// Keep-alive interval, never below the 5 s rumqttc accepts.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }

    /// Pause between reconnect attempts.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
