//! WebSocket connection manager.
//!
//! Owns the transport lifecycle for the backend socket: lazy connect,
//! reconnect on error after a fixed delay, immediate reconnect when the
//! server closes the connection, and a single inbound event stream.
//!
//! The socket is constructed without connecting — the caller wires up the
//! event receiver first, then calls [`SocketHandle::connect`], so the
//! first frames from the backend are never dropped. The identity
//! handshake and the reconnect probe are the app layer's job: it reacts
//! to [`SocketEvent::Connected`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pyforge_api::websocket::{SocketConfig, SocketHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let config = SocketConfig::new("ws://127.0.0.1:5000/socket".parse()?);
//! let (handle, mut events) = SocketHandle::new(config, cancel.clone());
//!
//! // wire listeners first...
//! let consumer = tokio::spawn(async move {
//!     while let Some(event) = events.recv().await { /* ... */ }
//! });
//!
//! // ...only then open the connection
//! handle.connect();
//! ```

use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::protocol::WsMessage;

/// Fixed delay before retrying after a failed connection attempt.
/// Deliberately not exponential: the backend is a single co-located
/// server, not a fleet, so there is no reconnection storm to spread out.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

// ── Events ───────────────────────────────────────────────────────────

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the connection (close frame or stream end).
    /// The manager reconnects immediately.
    Server { code: u16, reason: String },
    /// Transport failure (connect error, read error). The manager retries
    /// after [`RETRY_DELAY`].
    Transport(String),
    /// Local shutdown via the cancellation token. Terminal.
    Shutdown,
}

/// Connection lifecycle and inbound traffic, in arrival order.
#[derive(Debug)]
pub enum SocketEvent {
    /// The socket is open. `reconnect` is `true` for every connection
    /// after the first — the app layer sends the AID probe on those.
    Connected { reconnect: bool },
    /// The current connection ended.
    Disconnected { reason: DisconnectReason },
    /// One parsed inbound envelope.
    Message(WsMessage),
}

// ── SocketConfig ─────────────────────────────────────────────────────

/// Connection settings for the backend socket.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: Url,
    /// Delay before retrying a failed connection attempt.
    pub retry_delay: Duration,
}

impl SocketConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            retry_delay: RETRY_DELAY,
        }
    }
}

// ── SocketHandle ─────────────────────────────────────────────────────

/// Handle to the (possibly not yet opened) backend socket.
///
/// Created disconnected; [`connect`](Self::connect) spawns the
/// connection loop. Sending is decoupled from connection state — frames
/// queued while disconnected are flushed once a connection is up.
pub struct SocketHandle {
    outbound_tx: mpsc::UnboundedSender<WsMessage>,
    cancel: CancellationToken,
    pending: Mutex<Option<LoopArgs>>,
}

struct LoopArgs {
    config: SocketConfig,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
}

impl SocketHandle {
    /// Create the handle and its event stream without connecting.
    pub fn new(
        config: SocketConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let handle = Self {
            outbound_tx,
            cancel,
            pending: Mutex::new(Some(LoopArgs {
                config,
                event_tx,
                outbound_rx,
            })),
        };
        (handle, event_rx)
    }

    /// Open the connection and keep it open until shutdown.
    ///
    /// Idempotent — the loop is spawned at most once.
    pub fn connect(&self) {
        let args = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(args) = args {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                ws_loop(args.config, args.event_tx, args.outbound_rx, cancel).await;
            });
        }
    }

    /// Queue an envelope for the writer half.
    ///
    /// Returns `false` when the connection loop has shut down for good.
    pub fn send(&self, message: WsMessage) -> bool {
        self.outbound_tx.send(message).is_ok()
    }

    /// Signal the connection loop to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Connection loop ──────────────────────────────────────────────────

enum ConnectionEnd {
    Shutdown,
    ServerClose { code: u16, reason: String },
    Transport(String),
}

/// Main loop: connect → read/write → classify how the connection ended.
///
/// Server-initiated closes reconnect immediately; transport failures wait
/// `retry_delay` first; shutdown is terminal.
async fn ws_loop(
    config: SocketConfig,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
    cancel: CancellationToken,
) {
    let mut was_connected = false;

    loop {
        let end = tokio::select! {
            biased;
            _ = cancel.cancelled() => ConnectionEnd::Shutdown,
            end = run_connection(
                &config.url,
                &event_tx,
                &mut outbound_rx,
                &cancel,
                &mut was_connected,
            ) => end,
        };

        match end {
            ConnectionEnd::Shutdown => {
                let _ = event_tx.send(SocketEvent::Disconnected {
                    reason: DisconnectReason::Shutdown,
                });
                break;
            }
            ConnectionEnd::ServerClose { code, reason } => {
                tracing::info!(code, %reason, "server closed the socket, reconnecting");
                let _ = event_tx.send(SocketEvent::Disconnected {
                    reason: DisconnectReason::Server { code, reason },
                });
                // immediate reconnect
            }
            ConnectionEnd::Transport(message) => {
                tracing::warn!(error = %message, "socket error, retrying");
                let _ = event_tx.send(SocketEvent::Disconnected {
                    reason: DisconnectReason::Transport(message),
                });
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = event_tx.send(SocketEvent::Disconnected {
                            reason: DisconnectReason::Shutdown,
                        });
                        break;
                    }
                    () = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }

    tracing::debug!("socket loop exiting");
}

/// One connection: dial, then pump frames both ways until it ends.
async fn run_connection(
    url: &Url,
    event_tx: &mpsc::UnboundedSender<SocketEvent>,
    outbound_rx: &mut mpsc::UnboundedReceiver<WsMessage>,
    cancel: &CancellationToken,
    was_connected: &mut bool,
) -> ConnectionEnd {
    tracing::info!(url = %url, "connecting to backend socket");

    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => return ConnectionEnd::Transport(e.to_string()),
    };

    let reconnect = *was_connected;
    *was_connected = true;
    tracing::info!(reconnect, "socket connected");
    let _ = event_tx.send(SocketEvent::Connected { reconnect });

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return ConnectionEnd::Shutdown;
            }
            outgoing = outbound_rx.recv() => {
                let Some(message) = outgoing else {
                    return ConnectionEnd::Shutdown;
                };
                match message.to_wire() {
                    Ok(text) => {
                        if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                            return ConnectionEnd::Transport(e.to_string());
                        }
                    }
                    Err(e) => {
                        // A bad envelope must not take the connection down.
                        tracing::warn!(error = %e, "dropping unencodable envelope");
                    }
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match WsMessage::from_wire(&text) {
                            Ok(message) => {
                                let _ = event_tx.send(SocketEvent::Message(message));
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring unparseable frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pings automatically
                        tracing::trace!("socket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        return ConnectionEnd::ServerClose { code, reason };
                    }
                    Some(Err(e)) => {
                        return ConnectionEnd::Transport(e.to_string());
                    }
                    None => {
                        // Stream ended without a close frame: the server is
                        // gone, treat it like a server-side disconnect.
                        return ConnectionEnd::ServerClose { code: 1006, reason: String::new() };
                    }
                    _ => {
                        // Binary, Pong, Frame — the protocol is text-only
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use serde_json::json;

    fn test_config() -> SocketConfig {
        SocketConfig::new("ws://127.0.0.1:9/socket".parse().unwrap())
    }

    #[test]
    fn default_retry_delay_is_fixed_500ms() {
        let config = test_config();
        assert_eq!(config.retry_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn handle_is_lazy_until_connect() {
        let cancel = CancellationToken::new();
        let (handle, mut events) = SocketHandle::new(test_config(), cancel);

        // No loop spawned yet: sends queue, no events appear.
        assert!(handle.send(WsMessage::new(MessageType::Update, "x", json!({"value": 1}))));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let cancel = CancellationToken::new();
        let (handle, _events) = SocketHandle::new(test_config(), cancel.clone());

        handle.connect();
        handle.connect(); // second call must not panic or spawn again
        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_ends_the_loop_with_a_shutdown_event() {
        let cancel = CancellationToken::new();
        let (handle, mut events) = SocketHandle::new(test_config(), cancel.clone());

        handle.connect();
        handle.shutdown();

        // Skip transport noise from the unreachable endpoint; the loop
        // must terminate with a Shutdown disconnect.
        let mut saw_shutdown = false;
        while let Some(event) = events.recv().await {
            if let SocketEvent::Disconnected {
                reason: DisconnectReason::Shutdown,
            } = event
            {
                saw_shutdown = true;
                break;
            }
        }
        assert!(saw_shutdown);
    }
}
