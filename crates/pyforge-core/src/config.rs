//! Client configuration.
//!
//! The browser runtime receives this from the hosting page; here it is a
//! plain struct, typically produced by `pyforge-config` from a TOML
//! profile plus environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::theme::ThemeMode;

/// Static theme override templates, as JSON text.
///
/// Kept as strings because they come straight from configuration; they
/// are parsed (and validated) when the [`ThemeSet`](crate::ThemeSet) is
/// built, and a malformed template degrades to "no override".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeOverrides {
    /// Applied to both modes.
    pub base: Option<String>,
    /// Applied to the light variant only.
    pub light: Option<String>,
    /// Applied to the dark variant only.
    pub dark: Option<String>,
}

impl ThemeOverrides {
    pub fn for_mode(&self, mode: ThemeMode) -> &Option<String> {
        match mode {
            ThemeMode::Light => &self.light,
            ThemeMode::Dark => &self.dark,
        }
    }
}

/// Everything the client runtime needs to start.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (`http://` or `https://`); the socket endpoint
    /// is derived from it.
    pub url: Url,

    /// Start in dark mode.
    pub dark_mode: bool,

    /// Configured time zone; `"client"` means "use the local zone".
    pub time_zone: Option<String>,

    /// Apply the stylekit base theme under user overrides.
    pub stylekit: bool,

    /// Static theme templates.
    pub theme: ThemeOverrides,

    /// Directory for durable storage; `None` falls back to the platform
    /// data dir.
    pub storage_dir: Option<PathBuf>,

    /// Delay before retrying a failed socket connection.
    pub retry_delay: Duration,

    /// Broadcast buffer tick interval.
    pub broadcast_interval: Duration,
}

impl ClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            dark_mode: false,
            time_zone: None,
            stylekit: true,
            theme: ThemeOverrides::default(),
            storage_dir: None,
            retry_delay: pyforge_api::websocket::RETRY_DELAY,
            broadcast_interval: crate::broadcast::BROADCAST_INTERVAL,
        }
    }

    /// Derive the WebSocket endpoint from the base URL.
    pub fn socket_url(&self) -> Result<Url, CoreError> {
        let mut url = self.url.join("socket").map_err(|e| CoreError::Config {
            message: format!("cannot derive socket URL: {e}"),
        })?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot set socket scheme on {url}"),
        })?;
        Ok(url)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_follows_base_scheme() {
        let config = ClientConfig::new("http://localhost:5000/".parse().unwrap());
        assert_eq!(config.socket_url().unwrap().as_str(), "ws://localhost:5000/socket");

        let config = ClientConfig::new("https://app.example.com/forge/".parse().unwrap());
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "wss://app.example.com/forge/socket"
        );
    }
}
