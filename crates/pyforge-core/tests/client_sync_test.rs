// End-to-end tests for the client sync runtime: envelopes go in through
// the router, state comes out of the store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use pyforge_api::{MessageType, WsMessage};
use pyforge_core::outbound::ChannelSink;
use pyforge_core::router::dispatch_ws_message;
use pyforge_core::storage::{self, MemoryStorage};
use pyforge_core::{
    Action, App, AppEvent, BroadcastBuffer, ClientConfig, DurableStorage, Outbound, ThemeMode,
    UpdatePayload,
};

fn test_app() -> App {
    test_app_with(Arc::new(MemoryStorage::new()))
}

fn test_app_with(storage: Arc<MemoryStorage>) -> App {
    let config = ClientConfig::new("http://127.0.0.1:9/".parse().unwrap());
    App::new(config, storage).unwrap()
}

fn envelope(raw: Value) -> WsMessage {
    WsMessage::from_wire(&raw.to_string()).unwrap()
}

// ── Reducer properties through the full stack ────────────────────────

#[tokio::test]
async fn unknown_ack_leaves_state_pointer_identical() {
    let app = test_app();
    let before = app.state();
    app.dispatch(Action::ack("never-sent"));
    assert!(Arc::ptr_eq(&before, &app.state()));
}

#[tokio::test]
async fn out_of_order_pages_overlay_by_absolute_index() {
    let app = test_app();

    // Page two arrives first.
    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "U",
            "name": "tbl",
            "payload": {
                "value": {"data": [{"i": 100}], "start": 100},
                "infinite": true,
                "pagekey": "w"
            }
        })),
    )
    .await;
    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "U",
            "name": "tbl",
            "payload": {
                "value": {"data": [{"i": 0}, {"i": 1}], "start": 0},
                "infinite": true,
                "pagekey": "w"
            }
        })),
    )
    .await;

    let state = app.state();
    let rows = state.data["tbl"]["w"]["data"].as_array().unwrap();
    assert_eq!(rows.len(), 101);
    assert_eq!(rows[0], json!({"i": 0}));
    assert_eq!(rows[1], json!({"i": 1}));
    assert_eq!(rows[2], Value::Null);
    assert_eq!(rows[100], json!({"i": 100}));
}

#[tokio::test]
async fn batched_updates_apply_in_submission_order() {
    let app = test_app();
    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "MU",
            "payload": [
                {"name": "x", "payload": {"value": 1}},
                {"name": "x", "payload": {"value": 2}}
            ]
        })),
    )
    .await;
    assert_eq!(app.state().data["x"], json!(2));
}

#[tokio::test]
async fn backend_theme_suggestion_loses_to_stored_preference() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(storage::THEME_KEY, "light");
    let app = test_app_with(storage);

    app.dispatch(Action::theme(true, true));
    assert_eq!(app.state().theme.mode, ThemeMode::Light);
}

#[tokio::test]
async fn block_close_clears_state_and_durable_snapshot() {
    let storage = Arc::new(MemoryStorage::new());
    let app = test_app_with(storage.clone());

    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "BL",
            "noCancel": true,
            "action": "wait_for_it",
            "message": "hold on"
        })),
    )
    .await;
    assert!(app.state().block.is_some());

    // Backgrounding the page persists the dialog.
    app.page_visibility_changed(false);
    assert!(storage.get(storage::BLOCK_KEY).is_some());
    app.page_visibility_changed(true);

    dispatch_ws_message(&app, envelope(json!({"type": "BL", "close": true}))).await;
    assert!(app.state().block.is_none());
    assert!(storage.get(storage::BLOCK_KEY).is_none());
}

// ── Outbound round trip ──────────────────────────────────────────────

#[tokio::test]
async fn action_send_round_trips_through_ack() {
    let app = test_app();

    app.dispatch(Action::send_action(
        "on_button",
        Some("page_ctx".to_owned()),
        json!("pressed"),
        vec![json!(1)],
    ));
    let state = app.state();
    assert_eq!(state.ack_list.len(), 1);
    let ack_id = state.ack_list[0].clone();
    assert!(!ack_id.is_empty());

    // The matching ACK envelope clears the id.
    dispatch_ws_message(&app, envelope(json!({"type": "ACK", "id": ack_id}))).await;
    assert!(app.state().ack_list.is_empty());
}

#[tokio::test]
async fn outbound_envelope_survives_wire_encoding() {
    let sink = Arc::new(ChannelSink::new());
    let outbound = Outbound::new(sink.clone());

    let ack_id = outbound
        .send_with_ack(
            MessageType::Action,
            "on_button",
            json!({"action": "pressed", "args": []}),
            "c-1",
            Some("page_ctx"),
            None,
        )
        .unwrap();

    let sent = sink.drain().remove(0);
    let decoded = WsMessage::from_wire(&sent.to_wire().unwrap()).unwrap();
    assert_eq!(decoded.message_type, MessageType::Action);
    assert_eq!(decoded.name.as_deref(), Some("on_button"));
    assert_eq!(decoded.client_id.as_deref(), Some("c-1"));
    assert_eq!(decoded.module_context.as_deref(), Some("page_ctx"));
    assert_eq!(decoded.ack_id.as_deref(), Some(ack_id.as_str()));
}

// ── Router semantics ─────────────────────────────────────────────────

#[tokio::test]
async fn batched_values_are_materialized_before_dispatch() {
    let app = test_app();
    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "MU",
            "payload": [{
                "name": "tbl",
                "payload": {
                    "value": {
                        "__pyforge_format": "columnar",
                        "data": {"a": [1, 2], "b": ["x", "y"]}
                    }
                }
            }]
        })),
    )
    .await;

    // The store only ever sees row-major records.
    assert_eq!(
        app.state().data["tbl"]["data"],
        json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}])
    );
}

#[tokio::test]
async fn nested_batches_recurse() {
    let app = test_app();
    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "MS",
            "payload": [
                {"type": "U", "name": "a", "payload": {"value": 1}},
                {"type": "MS", "payload": [
                    {"type": "U", "name": "b", "payload": {"value": 2}}
                ]}
            ]
        })),
    )
    .await;

    let state = app.state();
    assert_eq!(state.data["a"], json!(1));
    assert_eq!(state.data["b"], json!(2));
}

#[tokio::test]
async fn unknown_tags_are_ignored() {
    let app = test_app();
    let before = app.state();
    dispatch_ws_message(&app, envelope(json!({"type": "XYZ", "payload": 1}))).await;
    dispatch_ws_message(&app, envelope(json!({"name": "no type at all"}))).await;
    assert!(Arc::ptr_eq(&before, &app.state()));
}

// ── Bootstrap handshake ──────────────────────────────────────────────

#[tokio::test]
async fn data_tree_diff_raises_init_then_reload() {
    let app = test_app();
    let mut events = app.events();

    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "GDT",
            "payload": {
                "variable": {"v1": {"type": "int"}},
                "function": {}
            }
        })),
    )
    .await;
    assert!(matches!(events.try_recv(), Ok(AppEvent::Init)));

    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "GDT",
            "payload": {
                "variable": {"v1": {"type": "int"}, "v2": {"type": "str"}},
                "function": {}
            }
        })),
    )
    .await;
    match events.try_recv() {
        Ok(AppEvent::Reload(changes)) => assert_eq!(changes.added, vec!["v2".to_owned()]),
        other => panic!("expected reload event, got {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_metadata_accumulates() {
    let app = test_app();

    dispatch_ws_message(&app, envelope(json!({"type": "ID", "id": "c-42"}))).await;
    assert_eq!(app.state().client_id, "c-42");

    dispatch_ws_message(
        &app,
        envelope(json!({"type": "AID", "payload": {"id": "app-1"}})),
    )
    .await;
    assert_eq!(app.app_id(), "app-1");

    dispatch_ws_message(
        &app,
        envelope(json!({
            "type": "GMC",
            "payload": {"context": "main", "metadata": "{\"designer\": true}"}
        })),
    )
    .await;
    assert_eq!(app.context(), "main");
    assert_eq!(app.metadata(), json!({"designer": true}));

    dispatch_ws_message(
        &app,
        envelope(json!({"type": "GR", "payload": [["/", "page1"], ["/other", "page2"]]})),
    )
    .await;
    assert_eq!(app.state().locations["/other"], "page2");
    assert_eq!(app.routes().unwrap().len(), 2);
}

// ── Broadcast pacing ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn broadcasts_drain_one_value_per_name_per_tick() {
    let app = test_app();

    for value in [1, 2, 3] {
        dispatch_ws_message(
            &app,
            envelope(json!({"type": "BC", "name": "n", "payload": {"value": value}})),
        )
        .await;
    }
    // Nothing reaches the state until a tick fires.
    assert!(!app.state().data.contains_key("n"));

    let buffer_tick = Duration::from_millis(250);
    let mut observed = Vec::new();
    let buffer: &BroadcastBuffer = app.broadcasts();
    for _ in 0..3 {
        tokio::time::advance(buffer_tick).await;
        for (name, value) in buffer.drain_one_round() {
            app.dispatch(Action::update(name, UpdatePayload::new(value)));
        }
        observed.push(app.state().data["n"].clone());
    }

    assert_eq!(observed, vec![json!(1), json!(2), json!(3)]);
    assert!(buffer.is_empty());
}
