//! Actions fed to the reducer.
//!
//! Each variant carries exactly what its transition needs. Constructors
//! mirror the outbound surface the view layer uses; the "send" kinds
//! carry a ready-to-encode payload and are the only actions that touch
//! the wire.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::state::{BlockMessage, FileDownload, NavigateMessage, NotificationMessage};

// ── Payload carriers ─────────────────────────────────────────────────

/// A `{name, payload}` pair as carried by update batches.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPayload {
    pub name: String,
    pub payload: Value,
}

/// Decoded payload of an inbound variable update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePayload {
    pub value: Value,
    /// Rows extend the existing window instead of replacing it.
    pub infinite: bool,
    /// Scopes paginated data under `data[name][page_key]`.
    pub page_key: Option<String>,
}

impl UpdatePayload {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            infinite: false,
            page_key: None,
        }
    }

    /// Pull the update fields out of a raw wire payload object.
    pub fn from_value(payload: Value) -> Self {
        let infinite = payload
            .get("infinite")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let page_key = payload
            .get("pagekey")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        Self {
            value,
            infinite,
            page_key,
        }
    }
}

// ── Data request options ─────────────────────────────────────────────

/// One column filter in a scoped data request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDesc {
    pub col: String,
    pub action: String,
    pub value: Value,
}

/// Optional knobs of a scoped data request. Unset fields are left off
/// the wire entirely so the backend sees the same envelopes a browser
/// client sends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataRequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applies: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltips: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handlenan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterDesc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_datas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_context: Option<Value>,
}

// ── Action ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Socket handshake completed.
    SocketConnected,
    /// Merge a value into `data[name]`.
    Update { name: String, payload: UpdatePayload },
    /// Fold a batch of updates left to right; later entries win.
    MultipleUpdate(Vec<NamedPayload>),
    /// Fold heterogeneous actions left to right.
    MultipleMessages(Vec<Action>),
    SetLocations(BTreeMap<String, String>),
    SetTheme { dark: bool, from_backend: bool },
    SetTimeZone { time_zone: String, from_backend: bool },
    SetNotification(NotificationMessage),
    DeleteNotification { id: String },
    SetBlock(BlockMessage),
    Navigate(NavigateMessage),
    ClientId(String),
    Acknowledgement(String),
    SetMenu(Value),
    /// `None` clears a pending download.
    DownloadFile(Option<FileDownload>),
    Partial { name: String, create: bool },

    // Outbound kinds; the reducer encodes and transmits these.
    SendUpdate {
        name: String,
        payload: Value,
        context: Option<String>,
        propagate: bool,
    },
    SendAction {
        name: String,
        payload: Value,
        context: Option<String>,
    },
    RequestDataUpdate {
        name: String,
        payload: Value,
        context: Option<String>,
    },
    RequestUpdate {
        payload: Value,
        context: Option<String>,
    },
    LocalStorage { payload: Value },
}

// ── Constructors ─────────────────────────────────────────────────────

impl Action {
    pub fn update(name: impl Into<String>, payload: UpdatePayload) -> Self {
        Self::Update {
            name: name.into(),
            payload,
        }
    }

    /// Update the variable `name` on the backend and invoke its
    /// `on_change` callback.
    pub fn send_update(
        name: impl Into<String>,
        value: Value,
        context: Option<String>,
        on_change: Option<&str>,
        propagate: bool,
        rel_name: Option<&str>,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert("value".to_owned(), value);
        if let Some(rel) = rel_name {
            payload.insert("relvar".to_owned(), Value::String(rel.to_owned()));
        }
        if let Some(on_change) = on_change {
            payload.insert("on_change".to_owned(), Value::String(on_change.to_owned()));
        }
        Self::SendUpdate {
            name: name.into(),
            payload: Value::Object(payload),
            context,
            propagate,
        }
    }

    /// Invoke the backend callback `name`.
    ///
    /// An object value is spread into the payload with `args` alongside;
    /// any other value is wrapped as `{action, args}`.
    pub fn send_action(
        name: impl Into<String>,
        context: Option<String>,
        value: Value,
        args: Vec<Value>,
    ) -> Self {
        let payload = match value {
            Value::Object(mut obj) => {
                obj.insert("args".to_owned(), Value::Array(args));
                Value::Object(obj)
            }
            other => json!({ "action": other, "args": args }),
        };
        Self::SendAction {
            name: name.into(),
            payload,
            context,
        }
    }

    /// Scoped data request (`get_data` on the backend).
    pub fn request_data_update(
        name: impl Into<String>,
        id: Option<&str>,
        context: Option<String>,
        columns: Vec<String>,
        page_key: impl Into<String>,
        options: &DataRequestOptions,
        all_data: bool,
        library: Option<&str>,
    ) -> Self {
        // Options serialize to an object; unwrap is safe for a struct.
        let mut payload = match serde_json::to_value(options) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(id) = id {
            payload.insert("id".to_owned(), Value::String(id.to_owned()));
        }
        payload.insert(
            "columns".to_owned(),
            Value::Array(columns.into_iter().map(Value::String).collect()),
        );
        payload.insert("pagekey".to_owned(), Value::String(page_key.into()));
        if let Some(library) = library {
            payload.insert("library".to_owned(), Value::String(library.to_owned()));
        }
        if all_data {
            payload.insert("alldata".to_owned(), Value::Bool(true));
        }
        Self::RequestDataUpdate {
            name: name.into(),
            payload: Value::Object(payload),
            context,
        }
    }

    /// Windowed table request.
    pub fn request_table_update(
        name: impl Into<String>,
        id: Option<&str>,
        context: Option<String>,
        columns: Vec<String>,
        page_key: impl Into<String>,
        options: &DataRequestOptions,
    ) -> Self {
        Self::request_data_update(name, id, context, columns, page_key, options, false, None)
    }

    /// Infinite-scroll table request; `reverse` walks the window from
    /// the end of the data set.
    pub fn request_infinite_table_update(
        name: impl Into<String>,
        id: Option<&str>,
        context: Option<String>,
        columns: Vec<String>,
        page_key: impl Into<String>,
        options: &DataRequestOptions,
        reverse: bool,
    ) -> Self {
        let mut action =
            Self::request_data_update(name, id, context, columns, page_key, options, false, None);
        if let Self::RequestDataUpdate {
            payload: Value::Object(map),
            ..
        } = &mut action
        {
            map.insert("infinite".to_owned(), Value::Bool(true));
            map.insert("reverse".to_owned(), Value::Bool(reverse));
        }
        action
    }

    /// Full-dataset chart request, optionally decimated.
    pub fn request_chart_update(
        name: impl Into<String>,
        id: Option<&str>,
        context: Option<String>,
        columns: Vec<String>,
        page_key: impl Into<String>,
        decimator_payload: Option<Value>,
    ) -> Self {
        let mut action = Self::request_data_update(
            name,
            id,
            context,
            columns,
            page_key,
            &DataRequestOptions::default(),
            true,
            None,
        );
        if let (
            Self::RequestDataUpdate {
                payload: Value::Object(map),
                ..
            },
            Some(decimator),
        ) = (&mut action, decimator_payload)
        {
            map.insert("decimatorPayload".to_owned(), decimator);
        }
        action
    }

    /// Ask the backend to re-send the variables in `names`.
    pub fn request_update(
        id: Option<&str>,
        context: Option<String>,
        names: Vec<String>,
        force_refresh: bool,
    ) -> Self {
        let mut payload = Map::new();
        if let Some(id) = id {
            payload.insert("id".to_owned(), Value::String(id.to_owned()));
        }
        payload.insert(
            "names".to_owned(),
            Value::Array(names.into_iter().map(Value::String).collect()),
        );
        payload.insert("refresh".to_owned(), Value::Bool(force_refresh));
        Self::RequestUpdate {
            payload: Value::Object(payload),
            context,
        }
    }

    pub fn set_locations(locations: BTreeMap<String, String>) -> Self {
        Self::SetLocations(locations)
    }

    pub fn theme(dark: bool, from_backend: bool) -> Self {
        Self::SetTheme { dark, from_backend }
    }

    pub fn time_zone(time_zone: impl Into<String>, from_backend: bool) -> Self {
        Self::SetTimeZone {
            time_zone: time_zone.into(),
            from_backend,
        }
    }

    pub fn notification(notification: NotificationMessage) -> Self {
        Self::SetNotification(notification)
    }

    pub fn delete_notification(id: impl Into<String>) -> Self {
        Self::DeleteNotification { id: id.into() }
    }

    pub fn block(block: BlockMessage) -> Self {
        Self::SetBlock(block)
    }

    pub fn navigate(navigation: NavigateMessage) -> Self {
        Self::Navigate(navigation)
    }

    pub fn client_id(id: impl Into<String>) -> Self {
        Self::ClientId(id.into())
    }

    pub fn ack(id: impl Into<String>) -> Self {
        Self::Acknowledgement(id.into())
    }

    pub fn download(download: Option<FileDownload>) -> Self {
        Self::DownloadFile(download)
    }

    pub fn set_menu(menu: Value) -> Self {
        Self::SetMenu(menu)
    }

    pub fn partial(name: impl Into<String>, create: bool) -> Self {
        Self::Partial {
            name: name.into(),
            create,
        }
    }

    /// Mirror browser local-storage values to the backend.
    pub fn local_storage(values: BTreeMap<String, String>) -> Self {
        let payload = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>();
        Self::LocalStorage {
            payload: Value::Object(payload),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn send_action_spreads_object_values() {
        let action = Action::send_action(
            "on_click",
            None,
            json!({"x": 1}),
            vec![json!("a"), json!(2)],
        );
        let Action::SendAction { payload, .. } = action else {
            panic!("wrong variant");
        };
        assert_eq!(payload, json!({"x": 1, "args": ["a", 2]}));
    }

    #[test]
    fn send_action_wraps_scalar_values() {
        let action = Action::send_action("on_click", None, json!("go"), vec![]);
        let Action::SendAction { payload, .. } = action else {
            panic!("wrong variant");
        };
        assert_eq!(payload, json!({"action": "go", "args": []}));
    }

    #[test]
    fn data_request_omits_unset_options() {
        let options = DataRequestOptions {
            start: Some(0),
            end: Some(99),
            ..DataRequestOptions::default()
        };
        let action = Action::request_table_update(
            "tbl",
            Some("tbl-1"),
            None,
            vec!["a".into()],
            "0-99",
            &options,
        );
        let Action::RequestDataUpdate { payload, .. } = action else {
            panic!("wrong variant");
        };
        assert_eq!(
            payload,
            json!({"start": 0, "end": 99, "id": "tbl-1", "columns": ["a"], "pagekey": "0-99"})
        );
    }

    #[test]
    fn infinite_request_carries_window_flags() {
        let action = Action::request_infinite_table_update(
            "tbl",
            None,
            None,
            vec![],
            "100-199",
            &DataRequestOptions::default(),
            true,
        );
        let Action::RequestDataUpdate { payload, .. } = action else {
            panic!("wrong variant");
        };
        assert_eq!(payload["infinite"], json!(true));
        assert_eq!(payload["reverse"], json!(true));
    }

    #[test]
    fn chart_request_asks_for_all_data() {
        let action = Action::request_chart_update(
            "chart",
            None,
            None,
            vec!["x".into(), "y".into()],
            "chart-key",
            Some(json!({"kind": "lttb"})),
        );
        let Action::RequestDataUpdate { payload, .. } = action else {
            panic!("wrong variant");
        };
        assert_eq!(payload["alldata"], json!(true));
        assert_eq!(payload["decimatorPayload"], json!({"kind": "lttb"}));
    }

    #[test]
    fn update_payload_extracts_paging_fields() {
        let payload = UpdatePayload::from_value(json!({
            "value": {"data": [1, 2]},
            "infinite": true,
            "pagekey": "0-1"
        }));
        assert!(payload.infinite);
        assert_eq!(payload.page_key.as_deref(), Some("0-1"));
        assert_eq!(payload.value, json!({"data": [1, 2]}));
    }
}
