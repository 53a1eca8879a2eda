//! The state transition function.
//!
//! `reduce` maps `(state, action)` to the next state. It is pure except
//! for two sanctioned effects routed through [`ReducerContext`]:
//! durable-storage reads/writes for the persisted preferences, and
//! outbound sends for the "send" action kinds (the only source of ack
//! ids). Every no-op transition returns the identical `Arc` so
//! subscribers can diff by pointer.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use pyforge_api::MessageType;

use crate::action::{Action, NamedPayload, UpdatePayload};
use crate::outbound::Outbound;
use crate::state::{self, AppState};
use crate::storage::{self, DurableStorage};
use crate::theme::{ThemeMode, ThemeSet};

/// Marker key the backend sets to force a component refresh; consumed
/// (removed) by the next update to the same variable.
const REFRESH_KEY: &str = "__pyforge_refresh";

/// Effectful collaborators of the reducer.
pub struct ReducerContext<'a> {
    pub storage: &'a dyn DurableStorage,
    pub outbound: &'a Outbound,
    pub themes: &'a ThemeSet,
    /// Blocking dialogs are persisted only while the page is hidden.
    pub page_visible: bool,
}

/// Overlay `new_rows` onto a copy of `previous` at absolute index
/// `start`. Indexes past the current end grow the array; holes left by
/// a window that starts beyond the end are padded with nulls, the
/// "not yet loaded" marker paginated consumers already understand.
pub fn add_rows(previous: &[Value], new_rows: Vec<Value>, start: usize) -> Vec<Value> {
    let needed = start + new_rows.len();
    let mut rows = previous.to_vec();
    if rows.len() < needed {
        rows.resize(needed, Value::Null);
    }
    for (offset, row) in new_rows.into_iter().enumerate() {
        rows[start + offset] = row;
    }
    rows
}

pub fn reduce(state: Arc<AppState>, action: Action, ctx: &ReducerContext<'_>) -> Arc<AppState> {
    match action {
        Action::SocketConnected => {
            if state.is_socket_connected {
                state
            } else {
                let mut next = (*state).clone();
                next.is_socket_connected = true;
                Arc::new(next)
            }
        }

        Action::Update { name, payload } => apply_update(&state, &name, payload),

        Action::MultipleUpdate(payloads) => payloads.into_iter().fold(state, |acc, pl| {
            let NamedPayload { name, payload } = pl;
            reduce(acc, Action::Update { name, payload: UpdatePayload::from_value(payload) }, ctx)
        }),

        Action::MultipleMessages(actions) => actions
            .into_iter()
            .fold(state, |acc, action| reduce(acc, action, ctx)),

        Action::SetLocations(locations) => {
            let mut next = (*state).clone();
            next.locations = locations;
            Arc::new(next)
        }

        Action::SetNotification(mut notification) => {
            if notification.id.is_empty() {
                notification.id = Uuid::new_v4().to_string();
            }
            let mut next = (*state).clone();
            next.notifications.push(notification);
            Arc::new(next)
        }

        Action::DeleteNotification { id } => {
            if state.notifications.iter().any(|n| n.id == id) {
                let mut next = (*state).clone();
                next.notifications.retain(|n| n.id != id);
                Arc::new(next)
            } else {
                state
            }
        }

        Action::SetBlock(block) => {
            if block.close {
                ctx.storage.remove(storage::BLOCK_KEY);
                if state.block.is_none() {
                    return state;
                }
                let mut next = (*state).clone();
                next.block = None;
                Arc::new(next)
            } else {
                let block = state::BlockMessage {
                    close: false,
                    ..block
                };
                if !ctx.page_visible {
                    persist_block(ctx.storage, &block);
                }
                let mut next = (*state).clone();
                next.block = Some(block);
                Arc::new(next)
            }
        }

        Action::Navigate(navigation) => {
            let mut next = (*state).clone();
            next.navigation = navigation;
            Arc::new(next)
        }

        Action::ClientId(id) => {
            ctx.storage.set(storage::CLIENT_ID_KEY, &id);
            let mut next = (*state).clone();
            next.client_id = id;
            Arc::new(next)
        }

        Action::Acknowledgement(id) => {
            if state.ack_list.iter().any(|ack| *ack == id) {
                let mut next = (*state).clone();
                next.ack_list.retain(|ack| *ack != id);
                Arc::new(next)
            } else {
                state
            }
        }

        Action::SetTheme { dark, from_backend } => {
            let requested = if dark { ThemeMode::Dark } else { ThemeMode::Light };
            let mode = if from_backend {
                // Local durable preference beats the backend suggestion.
                ThemeMode::from_str_or_light(&storage::get_value_in(
                    ctx.storage,
                    storage::THEME_KEY,
                    requested.as_str(),
                    &["light", "dark"],
                ))
            } else {
                requested
            };
            ctx.storage.set(storage::THEME_KEY, mode.as_str());
            if mode == state.theme.mode {
                state
            } else {
                let mut next = (*state).clone();
                next.theme = ctx.themes.get(mode).clone();
                Arc::new(next)
            }
        }

        Action::SetTimeZone { time_zone, from_backend } => {
            let suggested = if time_zone.is_empty() { "client" } else { time_zone.as_str() };
            let resolved = state::resolve_time_zone(ctx.storage, suggested, from_backend);
            ctx.storage.set(storage::TIME_ZONE_KEY, &resolved);
            if resolved == state.time_zone {
                state
            } else {
                let mut next = (*state).clone();
                next.time_zone = resolved;
                Arc::new(next)
            }
        }

        Action::SetMenu(menu) => {
            let mut next = (*state).clone();
            next.menu = menu;
            Arc::new(next)
        }

        Action::DownloadFile(download) => {
            if download.is_none() && state.download.is_none() {
                return state;
            }
            let mut next = (*state).clone();
            next.download = download;
            Arc::new(next)
        }

        Action::Partial { name, create } => {
            if create {
                let mut next = (*state).clone();
                next.data.insert(name, Value::Bool(true));
                Arc::new(next)
            } else if state.data.contains_key(&name) {
                let mut next = (*state).clone();
                next.data.remove(&name);
                Arc::new(next)
            } else {
                state
            }
        }

        // ── Outbound kinds ───────────────────────────────────────────
        Action::SendUpdate { name, payload, context, propagate } => track_ack(
            state.clone(),
            ctx.outbound.send_with_ack(
                MessageType::Update,
                &name,
                payload,
                &state.client_id,
                context.as_deref(),
                Some(propagate),
            ),
        ),

        Action::SendAction { name, payload, context } => track_ack(
            state.clone(),
            ctx.outbound.send_with_ack(
                MessageType::Action,
                &name,
                payload,
                &state.client_id,
                context.as_deref(),
                None,
            ),
        ),

        Action::RequestDataUpdate { name, payload, context } => track_ack(
            state.clone(),
            ctx.outbound.send_with_ack(
                MessageType::RequestDataUpdate,
                &name,
                payload,
                &state.client_id,
                context.as_deref(),
                None,
            ),
        ),

        Action::RequestUpdate { payload, context } => track_ack(
            state.clone(),
            ctx.outbound.send_with_ack(
                MessageType::RequestUpdate,
                "",
                payload,
                &state.client_id,
                context.as_deref(),
                None,
            ),
        ),

        Action::LocalStorage { payload } => track_ack(
            state.clone(),
            ctx.outbound.send_with_ack(
                MessageType::LocalStorage,
                "",
                payload,
                &state.client_id,
                None,
                None,
            ),
        ),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn track_ack(state: Arc<AppState>, ack_id: Option<String>) -> Arc<AppState> {
    match ack_id {
        Some(id) => {
            let mut next = (*state).clone();
            next.ack_list.push(id);
            Arc::new(next)
        }
        None => state,
    }
}

fn apply_update(state: &Arc<AppState>, name: &str, payload: UpdatePayload) -> Arc<AppState> {
    let mut old_value = match state.data.get(name) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    // A pending forced-refresh marker is consumed by this update.
    old_value.remove(REFRESH_KEY);

    let mut new_value = payload.value;
    if payload.infinite {
        extend_window(&old_value, &mut new_value, payload.page_key.as_deref());
    }

    let entry = match payload.page_key {
        Some(page_key) => {
            let mut scoped = old_value;
            scoped.insert(page_key, new_value);
            Value::Object(scoped)
        }
        None => new_value,
    };

    let mut next = (**state).clone();
    next.data.insert(name.to_owned(), entry);
    Arc::new(next)
}

/// Merge an infinite-scroll page into the rows already held under its
/// page key. Absent or non-numeric `start` leaves the payload alone.
fn extend_window(old_value: &Map<String, Value>, new_value: &mut Value, page_key: Option<&str>) {
    let Some(start) = new_value.get("start").and_then(Value::as_u64) else {
        return;
    };
    let previous = page_key
        .and_then(|key| old_value.get(key))
        .and_then(|scoped| scoped.get("data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let incoming = match new_value.get("data").and_then(Value::as_array) {
        Some(rows) => rows.clone(),
        None => return,
    };
    #[allow(clippy::cast_possible_truncation)]
    let merged = add_rows(&previous, incoming, start as usize);
    if let Some(obj) = new_value.as_object_mut() {
        obj.insert("data".to_owned(), Value::Array(merged));
    }
}

fn persist_block(storage: &dyn DurableStorage, block: &state::BlockMessage) {
    match serde_json::to_string(block) {
        Ok(text) => storage.set(storage::BLOCK_KEY, &text),
        Err(e) => tracing::warn!(error = %e, "cannot persist block dialog"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
