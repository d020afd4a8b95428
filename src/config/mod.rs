//! Configuration management for reddit-spy.
//!
//! Configuration is read from `~/.config/reddit-spy/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! The `DISCORD_TOKEN` environment variable takes precedence over the file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::evaluator::DEFAULT_WORKERS;
use crate::messenger::discord::DEFAULT_API_BASE;
use crate::orchestrator::PipelineSettings;
use crate::poller::{PollerSettings, DEFAULT_URL_TEMPLATE};

pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub poller: PollerConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub api_base: String,
    /// Serve the `add_subreddit_listener` slash command while running.
    pub commands: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            commands: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval: String,
    pub timeout: String,
    pub url_template: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: "30s".into(),
            timeout: "5s".into(),
            url_template: DEFAULT_URL_TEMPLATE.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file (default: `<data dir>/reddit-spy/reddit-spy.db`)
    pub path: Option<PathBuf>,
    /// Bound on every store and delivery call
    pub op_timeout: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            op_timeout: "5s".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_buffer: usize,
    pub result_buffer: usize,
    pub evaluator_workers: usize,
    pub resync_interval: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_buffer: 10,
            result_buffer: 10,
            evaluator_workers: DEFAULT_WORKERS,
            resync_interval: "5m".into(),
        }
    }
}

fn scaled(value: &str, factor: u64, unit: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Too many {}: {}", unit, value))
}

/// Parse a duration like "500ms", "30s", "5m", "1h", "1d" or raw seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();

    if let Some(millis) = s.strip_suffix("ms") {
        millis
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| format!("Invalid milliseconds: {}", millis))
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(secs) = s.strip_suffix('s') {
        scaled(secs, 1, "seconds")
    } else {
        s.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("Invalid duration: {}. Use format like '30s', '5m', '1h'", s))
    }
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_millis() != 0 || secs == 0 {
        format!("{}ms", d.as_millis())
    } else if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Upper bound for configured durations; timers cannot be scheduled
/// arbitrarily far ahead.
const MAX_DURATION: Duration = Duration::from_secs(365 * 86400);

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Ok(d) if d.is_zero() => Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".into(),
        }),
        Ok(d) if d > MAX_DURATION => Err(ConfigError::Invalid {
            field,
            reason: "must be at most 365d".into(),
        }),
        Ok(d) => Ok(d),
        Err(reason) => Err(ConfigError::Invalid { field, reason }),
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// If the default config file doesn't exist, creates one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::default_config_path()?;
                if !p.exists() {
                    Self::create_default_config(&p)?;
                    return Ok(Self::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/reddit-spy/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("reddit-spy").join("config.toml"))
    }

    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref p) = self.store.path {
            return Ok(p.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(data_dir.join("reddit-spy").join("reddit-spy.db"))
    }

    /// Check every derived setting so a bad value fails at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller_settings()?;
        self.pipeline_settings()?;
        Ok(())
    }

    /// The bot token, from the environment or the config file.
    pub fn discord_token(&self) -> Result<String, ConfigError> {
        std::env::var(TOKEN_ENV)
            .ok()
            .or_else(|| self.discord.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    pub fn op_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("store.op_timeout", &self.store.op_timeout)
    }

    pub fn poller_settings(&self) -> Result<PollerSettings, ConfigError> {
        if !self.poller.url_template.contains("{subreddit}") {
            return Err(ConfigError::Invalid {
                field: "poller.url_template",
                reason: "must contain {subreddit}".into(),
            });
        }
        Ok(PollerSettings {
            interval: duration_field("poller.interval", &self.poller.interval)?,
            timeout: duration_field("poller.timeout", &self.poller.timeout)?,
            url_template: self.poller.url_template.clone(),
        })
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let p = &self.pipeline;
        for (field, value) in [
            ("pipeline.batch_buffer", p.batch_buffer),
            ("pipeline.result_buffer", p.result_buffer),
            ("pipeline.evaluator_workers", p.evaluator_workers),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(PipelineSettings {
            batch_buffer: p.batch_buffer,
            result_buffer: p.result_buffer,
            evaluator_workers: p.evaluator_workers,
            resync_interval: duration_field("pipeline.resync_interval", &p.resync_interval)?,
            op_timeout: self.op_timeout()?,
        })
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# reddit-spy configuration
#
# Durations accept "500ms", "30s", "5m", "1h", "1d" or plain seconds.

[discord]
# Bot token. The DISCORD_TOKEN environment variable overrides this value.
# token = ""
api_base = "https://discord.com/api/v10"
# Register the add_subreddit_listener slash command and answer it
commands = true

[poller]
# Time between two fetches of the same subreddit
interval = "30s"
# Bound on a single listing fetch
timeout = "5s"
url_template = "https://www.reddit.com/r/{subreddit}/.json"

[store]
# Database file (default: <data dir>/reddit-spy/reddit-spy.db)
# path = "/var/lib/reddit-spy/reddit-spy.db"
# Bound on every database and delivery call
op_timeout = "5s"

[pipeline]
batch_buffer = 10
result_buffer = 10
# Concurrent (post, rule) checks per batch
evaluator_workers = 10
# How often stored subreddits are re-read to start new pollers
resync_interval = "5m"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("No Discord token: set {} or discord.token", TOKEN_ENV)]
    MissingToken,
}
