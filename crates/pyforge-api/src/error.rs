use thiserror::Error;

/// Top-level error type for the `pyforge-api` crate.
///
/// Covers the transport failure modes: WebSocket lifecycle, envelope
/// encoding/decoding, payload materialization, and the page-markup HTTP
/// endpoint. `pyforge-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The outbound channel to the socket writer is gone.
    #[error("WebSocket send channel closed")]
    ChannelClosed,

    // ── Protocol ────────────────────────────────────────────────────
    /// An envelope could not be serialized for the wire.
    #[error("Envelope encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound frame could not be parsed as an envelope.
    #[error("Envelope decoding failed: {message}")]
    Decode { message: String },

    /// A payload value could not be materialized (e.g. bad columnar data).
    #[error("Payload materialization failed: {message}")]
    Materialize { message: String },

    // ── HTTP (page fetch) ───────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The page endpoint answered with an error page. The body carries
    /// rendered error markup meant to be shown to the user as-is.
    #[error("Page fetch failed (HTTP {status})")]
    PageFetch { status: u16, markup: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Rendered error markup for page-fetch failures, if any.
    pub fn error_markup(&self) -> Option<&str> {
        match self {
            Self::PageFetch { markup, .. } => Some(markup),
            _ => None,
        }
    }
}
