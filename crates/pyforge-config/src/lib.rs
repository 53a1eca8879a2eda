//! Configuration for PyForge clients.
//!
//! TOML profiles merged with environment overrides, and translation to
//! `pyforge_core::ClientConfig`. A profile names one backend; the same
//! config file can describe several (development, staging, ...).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pyforge_core::{ClientConfig, ThemeOverrides};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

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
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults applied under every profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Start in dark mode.
    #[serde(default)]
    pub dark_mode: bool,

    /// Apply the stylekit base theme.
    #[serde(default = "default_stylekit")]
    pub stylekit: bool,

    /// Socket retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Broadcast drain interval in milliseconds.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            dark_mode: false,
            stylekit: default_stylekit(),
            retry_delay_ms: default_retry_delay_ms(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
        }
    }
}

fn default_stylekit() -> bool {
    true
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_broadcast_interval_ms() -> u64 {
    250
}

/// A named backend profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://127.0.0.1:5000").
    pub url: String,

    /// Time zone; "client" or unset means the local zone.
    pub time_zone: Option<String>,

    /// Override the dark-mode default.
    pub dark_mode: Option<bool>,

    /// Override the stylekit default.
    pub stylekit: Option<bool>,

    /// Theme template applied to both modes, as JSON text.
    pub theme: Option<String>,

    /// Theme template for the light variant only.
    pub theme_light: Option<String>,

    /// Theme template for the dark variant only.
    pub theme_dark: Option<String>,

    /// Directory for durable storage (client id, preferences).
    pub storage_dir: Option<PathBuf>,

    /// Override the retry delay.
    pub retry_delay_ms: Option<u64>,

    /// Override the broadcast interval.
    pub broadcast_interval_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "pyforge", "pyforge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default durable-storage directory when a profile does not set one.
pub fn storage_path() -> PathBuf {
    ProjectDirs::from("org", "pyforge", "pyforge")
        .map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pyforge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load a Config from an explicit file path + environment.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PYFORGE_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.to_owned(),
            })
    }
}

/// Build a `ClientConfig` from a profile.
pub fn profile_to_client_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let mut config = ClientConfig::new(url);
    config.dark_mode = profile.dark_mode.unwrap_or(defaults.dark_mode);
    config.time_zone = profile.time_zone.clone();
    config.stylekit = profile.stylekit.unwrap_or(defaults.stylekit);
    config.theme = ThemeOverrides {
        base: profile.theme.clone(),
        light: profile.theme_light.clone(),
        dark: profile.theme_dark.clone(),
    };
    config.storage_dir = Some(
        profile
            .storage_dir
            .clone()
            .unwrap_or_else(storage_path),
    );
    config.retry_delay =
        Duration::from_millis(profile.retry_delay_ms.unwrap_or(defaults.retry_delay_ms));
    config.broadcast_interval = Duration::from_millis(
        profile
            .broadcast_interval_ms
            .unwrap_or(defaults.broadcast_interval_ms),
    );
    Ok(config)
}

// ── Tests ────────────────────────────────────────────────────────────
