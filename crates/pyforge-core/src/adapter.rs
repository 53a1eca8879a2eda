//! Pluggable message handling.
//!
//! Extension libraries register a [`WsAdapter`] to claim protocol tags
//! before the built-in handling sees them. The router offers each
//! inbound envelope to adapters in registration order; the first one
//! that reports the message handled wins and gets its post-processing
//! hook invoked.

use serde_json::Value;

use pyforge_api::{MessageType, WsMessage};

use crate::action::Action;
use crate::app::{App, AppEvent};
use crate::data_manager::{get_requested_data_key, DataManager, ModuleData};
use crate::state::NotificationMessage;

pub trait WsAdapter: Send + Sync {
    /// Tags this adapter wants to see.
    fn supported_message_types(&self) -> &[MessageType];

    /// Handle one envelope. Return `true` to stop further processing
    /// of this message (adapters registered later and the built-in
    /// action translation are both skipped).
    fn handle_ws_message(&self, message: &WsMessage, app: &App) -> bool;

    /// Invoked after this adapter handled a message.
    fn post_ws_message_processing(&self, _message: &WsMessage, _app: &App) {}
}

// ── Built-in adapter ─────────────────────────────────────────────────

/// Marker the backend sets on a variable to force its tracked data
/// requests to be replayed.
const REFRESH_MARKER: &str = "__pyforge_refresh";

const SUPPORTED: &[MessageType] = &[
    MessageType::MultipleUpdate,
    MessageType::Id,
    MessageType::ModuleContext,
    MessageType::DataTree,
    MessageType::AppId,
    MessageType::Routes,
    MessageType::Alert,
    MessageType::Acknowledgement,
];

/// Tags that may complete the bootstrap handshake.
const INIT_TYPES: &[MessageType] = &[MessageType::Id, MessageType::AppId, MessageType::ModuleContext];

/// The built-in adapter: maintains the data-tree snapshots, drives the
/// bootstrap handshake, and surfaces runtime events.
#[derive(Default)]
pub struct PyForgeWsAdapter;

impl PyForgeWsAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when an entry carried the refresh marker and the
    /// tracked requests were replayed instead of applying values.
    fn handle_multiple_update(&self, message: &WsMessage, app: &App) -> bool {
        let Some(Value::Array(entries)) = &message.payload else {
            return false;
        };
        for entry in entries {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
            let payload = entry.get("payload").cloned().unwrap_or(Value::Null);
            let value = payload.get("value").cloned().unwrap_or(Value::Null);

            if value.get(REFRESH_MARKER).is_some() {
                for (_, options) in app.with_variable_data(|data| data.requested_options(name)) {
                    app.dispatch(Action::RequestDataUpdate {
                        name: name.to_owned(),
                        payload: options,
                        context: None,
                    });
                }
                return true;
            }

            let data_key = get_requested_data_key(&payload);
            app.with_variable_data(|data| {
                data.update(name, value.clone(), data_key.as_deref());
                if let Some(key) = &data_key {
                    data.forget_request(name, key);
                }
            });
            app.emit(AppEvent::VariableChange {
                name: name.to_owned(),
                value,
            });
        }
        false
    }

    fn handle_data_tree(&self, message: &WsMessage, app: &App) {
        let tree = |key: &str| -> ModuleData {
            message
                .payload
                .as_ref()
                .and_then(|p| p.get(key))
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        };
        let variables = tree("variable");
        let functions = tree("function");

        if app.has_data_managers() {
            let mut changes = app
                .with_variable_data(|data| data.init(variables))
                .unwrap_or_default();
            if let Some(more) = app.with_function_data(|data| data.init(functions)) {
                changes.merge(more);
            }
            if !changes.is_empty() {
                app.emit(AppEvent::Reload(changes));
            }
        } else {
            app.install_data_managers(DataManager::new(variables), DataManager::new(functions));
            app.emit(AppEvent::Init);
        }
    }
}

impl WsAdapter for PyForgeWsAdapter {
    fn supported_message_types(&self) -> &[MessageType] {
        SUPPORTED
    }

    fn handle_ws_message(&self, message: &WsMessage, app: &App) -> bool {
        match &message.message_type {
            MessageType::MultipleUpdate => {
                if self.handle_multiple_update(message, app) {
                    return true;
                }
                // Let the reducer fold the batch into the state tree.
                return false;
            }
            MessageType::Id => {
                if let Some(id) = &message.id {
                    app.dispatch(Action::client_id(id.clone()));
                }
            }
            MessageType::ModuleContext => {
                if let Some(payload) = &message.payload {
                    if let Some(context) = payload.get("context").and_then(Value::as_str) {
                        app.set_context(context);
                    }
                    if let Some(metadata) = payload.get("metadata").and_then(Value::as_str) {
                        match serde_json::from_str(metadata) {
                            Ok(parsed) => app.set_metadata(parsed),
                            Err(e) => {
                                tracing::warn!(error = %e, "cannot parse page metadata");
                            }
                        }
                    }
                }
            }
            MessageType::DataTree => self.handle_data_tree(message, app),
            MessageType::AppId => {
                if let Some(payload) = &message.payload {
                    if payload.get("name").and_then(Value::as_str) == Some("reconnect") {
                        // Server-side session is gone; run the full
                        // handshake again.
                        app.init();
                        return true;
                    }
                    if let Some(id) = payload.get("id").and_then(Value::as_str) {
                        app.set_app_id(id);
                    }
                }
            }
            MessageType::Routes => {
                if let Some(Value::Array(pairs)) = &message.payload {
                    let routes: Vec<(String, String)> = pairs
                        .iter()
                        .filter_map(|pair| {
                            let path = pair.get(0)?.as_str()?;
                            let route = pair.get(1)?.as_str()?;
                            Some((path.to_owned(), route.to_owned()))
                        })
                        .collect();
                    app.dispatch(Action::set_locations(routes.iter().cloned().collect()));
                    app.set_routes(routes);
                }
            }
            MessageType::Alert => {
                let kind =
                    NotificationMessage::normalize_kind(message.extra_str("atype").unwrap_or_default());
                let text = message.extra_str("message").unwrap_or_default().to_owned();
                app.emit(AppEvent::Notify {
                    kind: kind.clone(),
                    message: text.clone(),
                });
                app.dispatch(Action::notification(NotificationMessage {
                    kind,
                    message: text,
                    system: message.extra_bool("system").unwrap_or_default(),
                    duration: message
                        .extra
                        .get("duration")
                        .and_then(Value::as_u64)
                        .unwrap_or(3000),
                    id: message.extra_str("notificationId").unwrap_or_default().to_owned(),
                }));
            }
            MessageType::Acknowledgement => {
                if let Some(id) = &message.id {
                    app.dispatch(Action::ack(id.clone()));
                    app.emit(AppEvent::AckListUpdated(app.state().ack_list.clone()));
                }
            }
            _ => return false,
        }
        true
    }

    /// Once the bootstrap metadata is complete, ask for the full data
    /// tree exactly as a fresh page load would.
    fn post_ws_message_processing(&self, message: &WsMessage, app: &App) {
        if INIT_TYPES.contains(&message.message_type) && app.is_bootstrapped() {
            app.send_message(MessageType::DataTree, "get_data_tree", Value::Object(Default::default()));
        }
    }
}
