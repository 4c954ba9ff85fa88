use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dashcam/config.toml";
pub const DEFAULT_LOG_LEVEL: &str = "debug";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_INDICATOR_PIN: u8 = 18;
pub const DEFAULT_POWER_PIN: u8 = 17;
pub const DEFAULT_RECORDING_DIR: &str = "./media";
pub const DEFAULT_DISK_USAGE_TARGET: f64 = 80.0;

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Daemon configuration. Read once at startup from an optional TOML file,
/// then overridden field-by-field from the environment.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// tracing filter directive (e.g. "debug", "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Port the HTTP control surface listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// BCM number of the pin driving the recording LED.
    #[serde(default = "default_indicator_pin")]
    pub indicator_pin: u8,
    /// BCM number of the pin sensing the external power source.
    #[serde(default = "default_power_pin")]
    pub power_pin: u8,
    /// Directory completed recordings are published into.
    #[serde(default = "default_recording_dir")]
    pub recording_dir: PathBuf,
    /// Disk usage percentage above which old footage is rotated out.
    #[serde(default = "default_disk_usage_target")]
    pub disk_usage_target: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            http_port: default_http_port(),
            indicator_pin: default_indicator_pin(),
            power_pin: default_power_pin(),
            recording_dir: default_recording_dir(),
            disk_usage_target: default_disk_usage_target(),
        }
    }
}

/// Returns the config file location: `$DASHCAM_CONFIG` when set, otherwise
/// [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    std::env::var("DASHCAM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the config file at `path`, returning `Config::default()` if the file
/// does not exist. Returns an error if the file exists but cannot be read or
/// parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Applies environment overrides on top of `config`. `lookup` is injected so
/// tests do not have to mutate process-wide environment state; production
/// passes `|key| std::env::var(key).ok()`.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = lookup("LOG_FORMAT") {
        config.log_format = match v.to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => bail!("invalid log format: {other}"),
        };
    }
    if let Some(v) = lookup("HTTP_PORT") {
        config.http_port = v.parse().with_context(|| format!("invalid HTTP_PORT: {v}"))?;
    }
    if let Some(v) = lookup("INDICATOR_PIN") {
        config.indicator_pin = v
            .parse()
            .with_context(|| format!("invalid INDICATOR_PIN: {v}"))?;
    }
    if let Some(v) = lookup("MONITOR_PIN") {
        config.power_pin = v.parse().with_context(|| format!("invalid MONITOR_PIN: {v}"))?;
    }
    if let Some(v) = lookup("RECORDING_PATH") {
        config.recording_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DISK_USAGE_TARGET") {
        let target: f64 = v
            .parse()
            .with_context(|| format!("invalid DISK_USAGE_TARGET: {v}"))?;
        ensure!(
            (0.0..=100.0).contains(&target),
            "DISK_USAGE_TARGET must be between 0 and 100, got {target}"
        );
        config.disk_usage_target = target;
    }
    Ok(())
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_indicator_pin() -> u8 {
    DEFAULT_INDICATOR_PIN
}

fn default_power_pin() -> u8 {
    DEFAULT_POWER_PIN
}

fn default_recording_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RECORDING_DIR)
}

fn default_disk_usage_target() -> f64 {
    DEFAULT_DISK_USAGE_TARGET
}
