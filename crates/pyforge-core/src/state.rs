//! Application state.
//!
//! One immutable aggregate, replaced wholesale on every transition.
//! Consumers hold an `Arc<AppState>` and diff by pointer: the reducer
//! returns the identical `Arc` when nothing changed, so watchers can
//! skip work on no-op dispatches.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::storage::{self, DurableStorage};
use crate::theme::{Theme, ThemeMode, ThemeSet};

// ── Notification ─────────────────────────────────────────────────────

/// One entry in the notification stack. Insertion order is display
/// order; entries are removed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Normalized kind: "error", "warning", "info", "success", or the
    /// empty string for a bare snackbar-less notification.
    pub kind: String,
    pub message: String,
    pub system: bool,
    /// Display duration in milliseconds.
    pub duration: u64,
    pub id: String,
}

impl NotificationMessage {
    /// Normalize a backend alert kind. The wire accepts prefixes
    /// ("e", "err", "error" all mean error); anything unrecognized is
    /// "info", except the empty string which stays empty.
    pub fn normalize_kind(kind: &str) -> String {
        if kind.is_empty() {
            return String::new();
        }
        match kind.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('e') => "error",
            Some('w') => "warning",
            Some('s') => "success",
            _ => "info",
        }
        .to_owned()
    }
}

// ── Block ────────────────────────────────────────────────────────────

/// Payload name used when the user closes the blocking dialog.
pub const BLOCK_CLOSE_ACTION: &str = "UIBlocker.close";

/// Blocking-dialog descriptor pushed by the backend.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockMessage {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub no_cancel: bool,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub message: String,
}

// ── Navigation ───────────────────────────────────────────────────────

/// Last navigation request issued by the backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigateMessage {
    pub to: Option<String>,
    pub params: Option<BTreeMap<String, String>>,
    pub tab: Option<String>,
    pub force: bool,
}

// ── Download ─────────────────────────────────────────────────────────

/// At most one pending file download.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDownload {
    pub content: Option<String>,
    pub name: Option<String>,
    pub on_action: Option<String>,
}

// ── Aggregate ────────────────────────────────────────────────────────

/// The whole client state tree.
///
/// Cloned on every transition that changes anything; `data` values are
/// shared `Value` trees so a clone is shallow where nothing moved.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Variable-encoded-name to value, including nested per-page-key
    /// sub-maps for paginated data.
    pub data: BTreeMap<String, Value>,
    pub theme: Theme,
    pub time_zone: String,
    /// Path to route table.
    pub locations: BTreeMap<String, String>,
    pub notifications: Vec<NotificationMessage>,
    pub block: Option<BlockMessage>,
    pub navigation: NavigateMessage,
    pub client_id: String,
    pub app_id: String,
    pub menu: Value,
    pub download: Option<FileDownload>,
    /// Outstanding acknowledgement ids; order irrelevant.
    pub ack_list: Vec<String>,
    pub is_socket_connected: bool,
}

impl AppState {
    /// Build the initial state from configuration and whatever the
    /// durable store remembers from a previous session.
    pub fn initialize(
        storage: &dyn DurableStorage,
        themes: &ThemeSet,
        dark_mode: bool,
        configured_time_zone: Option<&str>,
    ) -> Self {
        let default_mode = if dark_mode { "dark" } else { "light" };
        let mode = ThemeMode::from_str_or_light(&storage::get_value_in(
            storage,
            storage::THEME_KEY,
            default_mode,
            &["light", "dark"],
        ));

        let time_zone = resolve_time_zone(
            storage,
            configured_time_zone.unwrap_or("client"),
            // A statically configured zone is authoritative at startup.
            configured_time_zone.is_none(),
        );

        let block = storage
            .get(storage::BLOCK_KEY)
            .and_then(|text| serde_json::from_str(&text).ok());

        Self {
            data: BTreeMap::new(),
            theme: themes.get(mode).clone(),
            time_zone,
            locations: BTreeMap::new(),
            notifications: Vec::new(),
            block,
            navigation: NavigateMessage::default(),
            client_id: storage.get(storage::CLIENT_ID_KEY).unwrap_or_default(),
            app_id: String::new(),
            menu: Value::Null,
            download: None,
            ack_list: Vec::new(),
            is_socket_connected: false,
        }
    }
}

/// Resolve a time zone against the local durable preference.
///
/// When `local_wins` is set and the store holds a preference, that
/// preference overrides `suggested`. The sentinel `"client"` means the
/// runtime's own zone (taken from `TZ`, falling back to UTC).
pub fn resolve_time_zone(
    storage: &dyn DurableStorage,
    suggested: &str,
    local_wins: bool,
) -> String {
    let chosen = if local_wins {
        storage::get_value_in(storage, storage::TIME_ZONE_KEY, suggested, &[])
    } else {
        suggested.to_owned()
    };
    if chosen == "client" {
        std::env::var("TZ").unwrap_or_else(|_| "UTC".to_owned())
    } else {
        chosen
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn kind_normalization() {
        assert_eq!(NotificationMessage::normalize_kind("Error"), "error");
        assert_eq!(NotificationMessage::normalize_kind("w"), "warning");
        assert_eq!(NotificationMessage::normalize_kind("success"), "success");
        assert_eq!(NotificationMessage::normalize_kind("banana"), "info");
        assert_eq!(NotificationMessage::normalize_kind(""), "");
    }

    #[test]
    fn initialize_restores_persisted_session() {
        let storage = MemoryStorage::new();
        storage.set(storage::CLIENT_ID_KEY, "c-7");
        storage.set(storage::THEME_KEY, "dark");
        storage.set(
            storage::BLOCK_KEY,
            r#"{"action":"a","no_cancel":true,"close":false,"message":"wait"}"#,
        );

        let themes = ThemeSet::default();
        let state = AppState::initialize(&storage, &themes, false, None);

        assert_eq!(state.client_id, "c-7");
        assert_eq!(state.theme.mode, ThemeMode::Dark);
        let block = state.block.unwrap();
        assert!(block.no_cancel);
        assert_eq!(block.message, "wait");
    }

    #[test]
    fn stored_theme_outside_allowed_set_is_ignored() {
        let storage = MemoryStorage::new();
        storage.set(storage::THEME_KEY, "sepia");
        let themes = ThemeSet::default();
        let state = AppState::initialize(&storage, &themes, true, None);
        // Falls back to the configured default.
        assert_eq!(state.theme.mode, ThemeMode::Dark);
    }

    #[test]
    fn configured_time_zone_beats_local_preference_at_startup() {
        let storage = MemoryStorage::new();
        storage.set(storage::TIME_ZONE_KEY, "Asia/Tokyo");
        let themes = ThemeSet::default();
        let state = AppState::initialize(&storage, &themes, false, Some("Europe/Paris"));
        assert_eq!(state.time_zone, "Europe/Paris");
    }
}
