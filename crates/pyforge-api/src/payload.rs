//! Async payload materialization.
//!
//! Tabular values inside `MU` batches may arrive column-oriented to keep
//! frames small. They must be turned into row-major records before the
//! state layer sees them — the store never observes a raw columnar value.

use serde_json::{Map, Value};

use crate::error::Error;

/// Marker key identifying a value that needs decoding before use.
pub const FORMAT_KEY: &str = "__pyforge_format";

const COLUMNAR: &str = "columnar";

/// Materialize one payload value.
///
/// Columnar objects (`{__pyforge_format: "columnar", data: {col: [..]}}`)
/// are rewritten with row-major `data`; every other value passes through
/// unchanged. Async so decoding can be scheduled in parallel across a
/// batch and heavier codecs can be added without changing callers.
pub async fn materialize_value(value: Value) -> Result<Value, Error> {
    let Some(format) = value.get(FORMAT_KEY).and_then(Value::as_str) else {
        return Ok(value);
    };

    match format {
        COLUMNAR => decode_columnar(value),
        other => Err(Error::Materialize {
            message: format!("unsupported payload format '{other}'"),
        }),
    }
}

/// Convert `{data: {col: [v0, v1, ..]}}` into `{data: [{col: v0}, ..]}`,
/// dropping the format marker and keeping every other key.
fn decode_columnar(value: Value) -> Result<Value, Error> {
    let Value::Object(mut obj) = value else {
        return Err(Error::Materialize {
            message: "columnar payload is not an object".into(),
        });
    };
    obj.remove(FORMAT_KEY);

    let Some(Value::Object(columns)) = obj.remove("data") else {
        return Err(Error::Materialize {
            message: "columnar payload has no 'data' column map".into(),
        });
    };

    let mut names = Vec::with_capacity(columns.len());
    let mut cols = Vec::with_capacity(columns.len());
    let mut row_count = 0usize;
    for (name, col) in columns {
        let Value::Array(items) = col else {
            return Err(Error::Materialize {
                message: format!("column '{name}' is not an array"),
            });
        };
        row_count = row_count.max(items.len());
        names.push(name);
        cols.push(items);
    }

    let mut rows = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let mut row = Map::with_capacity(names.len());
        for (name, col) in names.iter().zip(&cols) {
            // Ragged columns pad short ones with null.
            row.insert(name.clone(), col.get(i).cloned().unwrap_or(Value::Null));
        }
        rows.push(Value::Object(row));
    }

    obj.insert("data".into(), Value::Array(rows));
    Ok(Value::Object(obj))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn plain_values_pass_through() {
        let v = json!({"value": 42});
        assert_eq!(materialize_value(v.clone()).await.unwrap(), v);
    }

    #[tokio::test]
    async fn columnar_becomes_row_major() {
        let v = json!({
            "__pyforge_format": "columnar",
            "start": 10,
            "data": { "a": [1, 2], "b": ["x", "y"] }
        });
        let out = materialize_value(v).await.unwrap();
        assert_eq!(out["start"], 10);
        assert!(out.get(FORMAT_KEY).is_none());
        assert_eq!(
            out["data"],
            json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}])
        );
    }

    #[tokio::test]
    async fn ragged_columns_pad_with_null() {
        let v = json!({
            "__pyforge_format": "columnar",
            "data": { "a": [1, 2, 3], "b": ["x"] }
        });
        let out = materialize_value(v).await.unwrap();
        assert_eq!(out["data"][2], json!({"a": 3, "b": null}));
    }

    #[tokio::test]
    async fn unsupported_format_is_an_error() {
        let v = json!({"__pyforge_format": "arrow"});
        assert!(matches!(
            materialize_value(v).await,
            Err(Error::Materialize { .. })
        ));
    }
}
