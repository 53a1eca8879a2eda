//! Inbound message routing.
//!
//! One entry point, [`dispatch_ws_message`]: batches are normalized
//! first (`MU` values materialized in parallel, `MS` recursed), then the
//! envelope is offered to the registered adapters in order, and
//! whatever no adapter claims is translated to an action and reduced.

use std::collections::BTreeMap;

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use pyforge_api::payload::materialize_value;
use pyforge_api::{MessageType, WsMessage};

use crate::action::{Action, NamedPayload, UpdatePayload};
use crate::app::{App, AppEvent};
use crate::state::{BlockMessage, FileDownload, NavigateMessage, NotificationMessage};

/// Route one inbound envelope.
pub fn dispatch_ws_message<'a>(app: &'a App, message: WsMessage) -> BoxFuture<'a, ()> {
    async move {
        let mut message = message;
        match &message.message_type {
            MessageType::MultipleUpdate => {
                if !resolve_update_batch(&mut message).await {
                    return;
                }
            }
            MessageType::MultipleMessages => {
                // Recursive on purpose: a nested batch keeps its own
                // MU-resolution semantics.
                if let Some(Value::Array(entries)) = message.payload.take() {
                    for entry in entries {
                        match serde_json::from_value::<WsMessage>(entry) {
                            Ok(inner) => dispatch_ws_message(app, inner).await,
                            Err(e) => tracing::debug!(error = %e, "skipping malformed batch entry"),
                        }
                    }
                }
                return;
            }
            _ => {}
        }

        if app.offer_to_adapters(&message) {
            return;
        }
        if let Some(action) = message_to_action(app, &message) {
            app.dispatch(action);
        }
    }
    .boxed()
}

/// Materialize every value of an `MU` batch in parallel, writing the
/// results back positionally. Returns `false` when any value fails to
/// materialize; the whole batch is then dropped, never half-applied.
async fn resolve_update_batch(message: &mut WsMessage) -> bool {
    let Some(Value::Array(entries)) = &mut message.payload else {
        return true;
    };
    let pending = entries
        .iter()
        .map(|entry| {
            let value = entry
                .get("payload")
                .and_then(|p| p.get("value"))
                .cloned()
                .unwrap_or(Value::Null);
            materialize_value(value)
        })
        .collect::<Vec<_>>();

    match try_join_all(pending).await {
        Ok(values) => {
            for (entry, value) in entries.iter_mut().zip(values) {
                if let Some(payload) = entry.get_mut("payload").and_then(Value::as_object_mut) {
                    payload.insert("value".to_owned(), value);
                }
            }
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping update batch with unreadable value");
            false
        }
    }
}

/// Translate a single envelope into its reducer action. `None` means
/// the message was consumed as a side effect (favicon, broadcast) or
/// its tag is unknown; both are deliberate no-ops.
pub fn message_to_action(app: &App, message: &WsMessage) -> Option<Action> {
    match &message.message_type {
        MessageType::Update => Some(Action::update(
            message.name.clone().unwrap_or_default(),
            UpdatePayload::from_value(message.payload.clone().unwrap_or(Value::Null)),
        )),

        MessageType::MultipleUpdate => {
            let Some(Value::Array(entries)) = &message.payload else {
                return None;
            };
            let payloads = entries
                .iter()
                .map(|entry| NamedPayload {
                    name: entry
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    payload: entry.get("payload").cloned().unwrap_or(Value::Null),
                })
                .collect();
            Some(Action::MultipleUpdate(payloads))
        }

        MessageType::Alert => Some(Action::notification(NotificationMessage {
            kind: NotificationMessage::normalize_kind(
                message.extra_str("atype").unwrap_or_default(),
            ),
            message: message.extra_str("message").unwrap_or_default().to_owned(),
            system: message.extra_bool("system").unwrap_or_default(),
            duration: message
                .extra
                .get("duration")
                .and_then(Value::as_u64)
                .unwrap_or(3000),
            id: message
                .extra_str("notificationId")
                .unwrap_or_default()
                .to_owned(),
        })),

        MessageType::Block => Some(Action::block(BlockMessage {
            action: message.extra_str("action").unwrap_or_default().to_owned(),
            no_cancel: message.extra_bool("noCancel").unwrap_or_default(),
            close: message.extra_bool("close").unwrap_or_default(),
            message: message.extra_str("message").unwrap_or_default().to_owned(),
        })),

        MessageType::Navigate => Some(Action::navigate(NavigateMessage {
            to: message.extra_str("to").map(str::to_owned),
            params: message.extra.get("params").and_then(|params| {
                serde_json::from_value::<BTreeMap<String, String>>(params.clone()).ok()
            }),
            tab: message.extra_str("tab").map(str::to_owned),
            force: message.extra_bool("force").unwrap_or_default(),
        })),

        MessageType::Id => message.id.clone().map(Action::client_id),

        MessageType::DownloadFile => Some(Action::download(
            message.extra_str("content").map(|content| FileDownload {
                content: Some(content.to_owned()),
                name: message.extra_str("name").map(str::to_owned),
                on_action: message.extra_str("onAction").map(str::to_owned),
            }),
        )),

        MessageType::Partial => message
            .name
            .clone()
            .map(|name| Action::partial(name, true)),

        MessageType::Acknowledgement => message.id.clone().map(Action::ack),

        MessageType::Favicon => {
            if let Some(url) = message
                .payload
                .as_ref()
                .and_then(|p| p.get("value"))
                .and_then(Value::as_str)
            {
                app.emit(AppEvent::Favicon(url.to_owned()));
            }
            None
        }

        MessageType::Broadcast => {
            if let Some(name) = &message.name {
                let value = message
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null);
                app.stack_broadcast(name, value);
            }
            None
        }

        _ => None,
    }
}
