// ── Core error types ──
//
// User-facing errors from pyforge-core. Consumers never see raw
// transport failures — the `From<pyforge_api::Error>` impl translates
// them into domain-appropriate variants. Most runtime paths do not
// error at all: the design favors availability, so malformed payloads
// and dropped connections are logged and recovered from in place.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Backend disconnected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Durable storage error: {message}")]
    Storage { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pyforge_api::Error> for CoreError {
    fn from(err: pyforge_api::Error) -> Self {
        match err {
            pyforge_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            pyforge_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("socket closed (code {code}): {reason}"),
            },
            pyforge_api::Error::ChannelClosed => CoreError::Disconnected,
            pyforge_api::Error::Encode(e) => {
                CoreError::Internal(format!("envelope encoding failed: {e}"))
            }
            pyforge_api::Error::Decode { message }
            | pyforge_api::Error::Materialize { message } => {
                CoreError::InvalidPayload { message }
            }
            pyforge_api::Error::Transport(e) => CoreError::ConnectionFailed {
                url: e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_default(),
                reason: e.to_string(),
            },
            pyforge_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            pyforge_api::Error::PageFetch { status, markup } => CoreError::InvalidPayload {
                message: format!("page fetch failed (HTTP {status}): {markup}"),
            },
        }
    }
}
