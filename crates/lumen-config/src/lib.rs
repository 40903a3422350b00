//! Shared configuration for lumen front-ends.
//!
//! A TOML file in the platform config directory, layered over defaults and
//! under `LUMEN_*` environment variables, translated into
//! `lumen_core::LinkConfig`. Durations are human-readable (`"2500ms"`, `"1m"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lumen_core::{DiscoveryConfig, LinkConfig, ReconnectPolicy};

/// File name of the persisted device registry inside the data directory.
pub const REGISTRY_FILE: &str = "devices.json";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Output and presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Connectivity tuning.
    #[serde(default)]
    pub link: Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Link {
    /// Timeout for the one-shot identification request.
    #[serde(default = "default_identify_timeout")]
    pub identify_timeout: String,

    /// First reconnect delay; doubles per failed attempt.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base: String,

    /// Upper bound for the reconnect delay.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max: String,

    /// Per-address TCP probe timeout during discovery.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Registry file. Defaults to `devices.json` in the platform data dir.
    pub registry_path: Option<PathBuf>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            identify_timeout: default_identify_timeout(),
            reconnect_base: default_reconnect_base(),
            reconnect_max: default_reconnect_max(),
            probe_timeout: default_probe_timeout(),
            service_type: default_service_type(),
            registry_path: None,
        }
    }
}

fn fmt_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}
fn default_identify_timeout() -> String {
    fmt_duration(lumen_core::config::DEFAULT_IDENTIFY_TIMEOUT)
}
fn default_reconnect_base() -> String {
    fmt_duration(ReconnectPolicy::default().base_delay)
}
fn default_reconnect_max() -> String {
    fmt_duration(ReconnectPolicy::default().max_delay)
}
fn default_probe_timeout() -> String {
    fmt_duration(lumen_core::config::DEFAULT_PROBE_TIMEOUT)
}
fn default_service_type() -> String {
    lumen_core::config::SERVICE_TYPE.into()
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "lumen", "lumen")
}

fn home_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("lumen");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the registry file.
pub fn default_registry_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join(REGISTRY_FILE),
        |dirs| dirs.data_dir().join(REGISTRY_FILE),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if present), then `LUMEN_*`
/// variables. Nested keys use a double underscore:
/// `LUMEN_LINK__RECONNECT_MAX=30s`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LUMEN_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, falling back to defaults on any error.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let parsed = humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}' is not a duration: {e}"),
    })?;
    if parsed.is_zero() {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}

impl Config {
    /// Build runtime settings. The registry always persists; an unset path
    /// resolves to [`default_registry_path`].
    pub fn to_link_config(&self) -> Result<LinkConfig, ConfigError> {
        let link = &self.link;
        let base_delay = parse_duration("link.reconnect_base", &link.reconnect_base)?;
        let max_delay = parse_duration("link.reconnect_max", &link.reconnect_max)?;
        if max_delay < base_delay {
            return Err(ConfigError::Validation {
                field: "link.reconnect_max".into(),
                reason: format!(
                    "{} is shorter than reconnect_base ({})",
                    link.reconnect_max, link.reconnect_base
                ),
            });
        }
        if link.service_type.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "link.service_type".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(LinkConfig {
            identify_timeout: parse_duration("link.identify_timeout", &link.identify_timeout)?,
            reconnect: ReconnectPolicy {
                base_delay,
                max_delay,
            },
            discovery: DiscoveryConfig {
                service_type: link.service_type.trim().to_owned(),
                probe_timeout: parse_duration("link.probe_timeout", &link.probe_timeout)?,
            },
            registry_path: Some(
                link.registry_path
                    .clone()
                    .unwrap_or_else(default_registry_path),
            ),
        })
    }
}
