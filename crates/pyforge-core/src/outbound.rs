//! Outbound envelope encoding.
//!
//! The reducer is synchronous, so sends go through a sink abstraction
//! that never blocks: the live implementation queues onto the socket's
//! unbounded channel, tests capture envelopes in memory.

use serde_json::Value;
use uuid::Uuid;

use pyforge_api::{MessageType, SocketHandle, WsMessage};

// ── Sink ─────────────────────────────────────────────────────────────

/// Non-blocking envelope sink.
pub trait WireSink: Send + Sync {
    /// Queue an envelope; returns `false` when the connection is gone.
    fn send(&self, message: WsMessage) -> bool;
}

impl WireSink for SocketHandle {
    fn send(&self, message: WsMessage) -> bool {
        SocketHandle::send(self, message)
    }
}

/// Captures envelopes for inspection; the test double.
#[derive(Default)]
pub struct ChannelSink {
    sent: std::sync::Mutex<Vec<WsMessage>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<WsMessage> {
        self.sent.lock().map(|mut v| std::mem::take(&mut *v)).unwrap_or_default()
    }
}

impl WireSink for ChannelSink {
    fn send(&self, message: WsMessage) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        true
    }
}

// ── Encoder ──────────────────────────────────────────────────────────

/// Builds and queues outbound envelopes, stamping each acknowledged
/// send with a fresh ack id.
pub struct Outbound {
    sink: std::sync::Arc<dyn WireSink>,
}

impl Outbound {
    pub fn new(sink: std::sync::Arc<dyn WireSink>) -> Self {
        Self { sink }
    }

    /// Fire-and-forget send, no acknowledgement requested.
    pub fn send(
        &self,
        message_type: MessageType,
        name: &str,
        payload: Value,
        client_id: &str,
        module_context: Option<&str>,
    ) -> bool {
        let message = self.build(message_type, name, payload, client_id, module_context, None);
        self.sink.send(message)
    }

    /// Send with an acknowledgement id; returns the id when the
    /// envelope was queued so the caller can track it in the ack list.
    pub fn send_with_ack(
        &self,
        message_type: MessageType,
        name: &str,
        payload: Value,
        client_id: &str,
        module_context: Option<&str>,
        propagate: Option<bool>,
    ) -> Option<String> {
        let ack_id = Uuid::new_v4().to_string();
        let message = self.build(
            message_type,
            name,
            payload,
            client_id,
            module_context,
            propagate,
        );
        let message = WsMessage {
            ack_id: Some(ack_id.clone()),
            ..message
        };
        self.sink.send(message).then_some(ack_id)
    }

    fn build(
        &self,
        message_type: MessageType,
        name: &str,
        payload: Value,
        client_id: &str,
        module_context: Option<&str>,
        propagate: Option<bool>,
    ) -> WsMessage {
        let mut message = WsMessage::new(message_type, name, payload);
        message.client_id = Some(client_id.to_owned());
        message.module_context = module_context.map(str::to_owned);
        // Only carried when explicitly false; true is the wire default.
        message.propagate = match propagate {
            Some(false) => Some(false),
            _ => None,
        };
        message
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn ack_ids_are_unique_and_attached() {
        let sink = Arc::new(ChannelSink::new());
        let outbound = Outbound::new(sink.clone());

        let a = outbound
            .send_with_ack(MessageType::Action, "on_click", json!({}), "c-1", None, None)
            .unwrap();
        let b = outbound
            .send_with_ack(MessageType::Action, "on_click", json!({}), "c-1", None, None)
            .unwrap();
        assert_ne!(a, b);

        let sent = sink.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].ack_id.as_deref(), Some(a.as_str()));
        assert_eq!(sent[1].ack_id.as_deref(), Some(b.as_str()));
    }

    #[test]
    fn propagate_only_serialized_when_disabled() {
        let sink = Arc::new(ChannelSink::new());
        let outbound = Outbound::new(sink.clone());

        outbound.send_with_ack(
            MessageType::Update,
            "v",
            json!({"value": 1}),
            "c-1",
            None,
            Some(true),
        );
        outbound.send_with_ack(
            MessageType::Update,
            "v",
            json!({"value": 2}),
            "c-1",
            None,
            Some(false),
        );

        let sent = sink.drain();
        assert_eq!(sent[0].propagate, None);
        assert_eq!(sent[1].propagate, Some(false));
    }
}
