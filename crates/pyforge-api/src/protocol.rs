//! Wire protocol envelope for the PyForge backend socket.
//!
//! Every frame is a JSON envelope `{type, name?, payload?, id?, ...}` where
//! `type` is a short tag. Fields beyond the core set are captured in
//! `extra` so nothing the backend sends is silently dropped — alert,
//! block, and navigate messages carry their fields at the envelope level.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── MessageType ──────────────────────────────────────────────────────

/// The message tag of a wire envelope.
///
/// Unknown tags are preserved as [`Unknown`](MessageType::Unknown) so the
/// router can ignore them without failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `ID` — identity handshake / assigned client id.
    Id,
    /// `AID` — application-instance id; also the reconnect probe.
    AppId,
    /// `U` — single variable update.
    Update,
    /// `MU` — batched variable updates.
    MultipleUpdate,
    /// `MS` — batched heterogeneous messages.
    MultipleMessages,
    /// `GDT` — request/response full data tree.
    DataTree,
    /// `GMC` — context + metadata bootstrap.
    ModuleContext,
    /// `GR` — route table.
    Routes,
    /// `AL` — alert/notification.
    Alert,
    /// `BL` — block/unblock UI.
    Block,
    /// `NA` — navigate.
    Navigate,
    /// `DF` — file download.
    DownloadFile,
    /// `PR` — partial-page create/remove.
    Partial,
    /// `ACK` — acknowledge a prior outbound id.
    Acknowledgement,
    /// `FV` — favicon change.
    Favicon,
    /// `BC` — broadcast value.
    Broadcast,
    /// `DU` — request scoped data (outbound).
    RequestDataUpdate,
    /// `A` — invoke backend callback (outbound).
    Action,
    /// `RU` — request variable refresh (outbound).
    RequestUpdate,
    /// `LS` — sync local-storage value (outbound).
    LocalStorage,
    /// Anything else, kept verbatim. An empty tag means `type` was absent.
    Unknown(String),
}

impl MessageType {
    /// The wire tag for this message type.
    pub fn as_tag(&self) -> &str {
        match self {
            Self::Id => "ID",
            Self::AppId => "AID",
            Self::Update => "U",
            Self::MultipleUpdate => "MU",
            Self::MultipleMessages => "MS",
            Self::DataTree => "GDT",
            Self::ModuleContext => "GMC",
            Self::Routes => "GR",
            Self::Alert => "AL",
            Self::Block => "BL",
            Self::Navigate => "NA",
            Self::DownloadFile => "DF",
            Self::Partial => "PR",
            Self::Acknowledgement => "ACK",
            Self::Favicon => "FV",
            Self::Broadcast => "BC",
            Self::RequestDataUpdate => "DU",
            Self::Action => "A",
            Self::RequestUpdate => "RU",
            Self::LocalStorage => "LS",
            Self::Unknown(tag) => tag,
        }
    }

    /// Parse a wire tag. Never fails — unrecognized tags become `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ID" => Self::Id,
            "AID" => Self::AppId,
            "U" => Self::Update,
            "MU" => Self::MultipleUpdate,
            "MS" => Self::MultipleMessages,
            "GDT" => Self::DataTree,
            "GMC" => Self::ModuleContext,
            "GR" => Self::Routes,
            "AL" => Self::Alert,
            "BL" => Self::Block,
            "NA" => Self::Navigate,
            "DF" => Self::DownloadFile,
            "PR" => Self::Partial,
            "ACK" => Self::Acknowledgement,
            "FV" => Self::Favicon,
            "BC" => Self::Broadcast,
            "DU" => Self::RequestDataUpdate,
            "A" => Self::Action,
            "RU" => Self::RequestUpdate,
            "LS" => Self::LocalStorage,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// `true` when the tag is absent or not one the protocol defines.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = MessageType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message tag string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(MessageType::from_tag(v))
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

// ── WsMessage ────────────────────────────────────────────────────────

/// One wire envelope.
///
/// Optional fields are omitted from serialization when unset, matching
/// the backend's expectation of lean payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsMessage {
    /// Message tag. A missing `type` deserializes to an empty `Unknown`.
    #[serde(rename = "type", default)]
    pub message_type: MessageType,

    /// Variable or callback name the message refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Message payload. Shape depends on the tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Identifier carried by `ID` and `ACK` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Whether the backend should propagate a value update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate: Option<bool>,

    /// Session identifier attached to outbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Execution context attached to outbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_context: Option<String>,

    /// Acknowledgement correlation id requested for this send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,

    /// Everything else the backend sends (alert/block/navigate fields
    /// live at the envelope level).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WsMessage {
    /// Build an envelope with just a tag, name, and payload.
    pub fn new(message_type: MessageType, name: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type,
            name: Some(name.into()),
            payload: Some(payload),
            ..Self::default()
        }
    }

    /// Serialize to the wire (JSON text frame).
    pub fn to_wire(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::Encode)
    }

    /// Parse an inbound text frame.
    pub fn from_wire(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
        })
    }

    /// Envelope-level field from `extra`, as a string.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Envelope-level field from `extra`, as a bool.
    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(Value::as_bool)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_round_trip() {
        for tag in [
            "ID", "AID", "U", "MU", "MS", "GDT", "GMC", "GR", "AL", "BL", "NA", "DF", "PR",
            "ACK", "FV", "BC", "DU", "A", "RU", "LS",
        ] {
            let ty = MessageType::from_tag(tag);
            assert!(!ty.is_unknown(), "{tag} should be a known tag");
            assert_eq!(ty.as_tag(), tag);
        }
    }

    #[test]
    fn unknown_tag_preserved() {
        let ty = MessageType::from_tag("XYZ");
        assert!(ty.is_unknown());
        assert_eq!(ty.as_tag(), "XYZ");
    }

    #[test]
    fn missing_type_is_unknown() {
        let msg = WsMessage::from_wire(r#"{"name":"x"}"#).unwrap();
        assert!(msg.message_type.is_unknown());
        assert_eq!(msg.name.as_deref(), Some("x"));
    }

    #[test]
    fn envelope_extra_fields_captured() {
        let raw = json!({
            "type": "AL",
            "atype": "error",
            "message": "boom",
            "system": true,
            "duration": 3000
        });
        let msg = WsMessage::from_wire(&raw.to_string()).unwrap();
        assert_eq!(msg.message_type, MessageType::Alert);
        assert_eq!(msg.extra_str("atype"), Some("error"));
        assert_eq!(msg.extra_str("message"), Some("boom"));
        assert_eq!(msg.extra_bool("system"), Some(true));
    }

    #[test]
    fn outbound_envelope_skips_unset_fields() {
        let msg = WsMessage::new(MessageType::Action, "on_button", json!({"args": []}));
        let wire = msg.to_wire().unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["type"], "A");
        assert_eq!(value["name"], "on_button");
        assert!(value.get("ack_id").is_none());
        assert!(value.get("propagate").is_none());
    }

    #[test]
    fn malformed_frame_is_a_decode_error() {
        assert!(matches!(
            WsMessage::from_wire("not json"),
            Err(Error::Decode { .. })
        ));
    }
}
