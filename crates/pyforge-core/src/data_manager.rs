//! Data-tree snapshots for extension consumers.
//!
//! The backend describes its variables and callable functions as a
//! "data tree" sent over `GDT`. A [`DataManager`] keeps the latest
//! snapshot, diffs re-sent trees so consumers learn exactly what moved,
//! and tracks outstanding scoped data requests by page key so a forced
//! refresh can replay them.

use std::collections::BTreeMap;

use serde_json::Value;

/// One data tree: encoded variable name to descriptor.
pub type ModuleData = BTreeMap<String, Value>;

/// Delta between two data trees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ModuleChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Fold another delta in; used to combine the variable and function
    /// tree diffs into one reload notification.
    pub fn merge(&mut self, other: ModuleChanges) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.changed.extend(other.changed);
    }
}

/// Extract the page key scoping a data-request response.
pub fn get_requested_data_key(payload: &Value) -> Option<String> {
    payload
        .get("pagekey")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

pub struct DataManager {
    data: ModuleData,
    /// Encoded name to page key to the request options that produced it.
    requested: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DataManager {
    pub fn new(data: ModuleData) -> Self {
        Self {
            data,
            requested: BTreeMap::new(),
        }
    }

    pub fn get(&self, encoded_name: &str) -> Option<&Value> {
        self.data.get(encoded_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Replace the tree with a re-sent snapshot, reporting the delta.
    /// Returns `None` when nothing changed.
    pub fn init(&mut self, data: ModuleData) -> Option<ModuleChanges> {
        let mut changes = ModuleChanges::default();
        for (name, descriptor) in &data {
            match self.data.get(name) {
                None => changes.added.push(name.clone()),
                Some(old) if old != descriptor => changes.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in self.data.keys() {
            if !data.contains_key(name) {
                changes.removed.push(name.clone());
            }
        }
        self.data = data;
        if changes.is_empty() {
            None
        } else {
            Some(changes)
        }
    }

    /// Store an updated value, scoped under its page key when the
    /// update answers a tracked data request.
    pub fn update(&mut self, encoded_name: &str, value: Value, data_key: Option<&str>) {
        match data_key {
            Some(key) => {
                let entry = self
                    .data
                    .entry(encoded_name.to_owned())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                if let Some(obj) = entry.as_object_mut() {
                    obj.insert(key.to_owned(), value);
                }
            }
            None => {
                self.data.insert(encoded_name.to_owned(), value);
            }
        }
    }

    /// Remember the options of an in-flight scoped request.
    pub fn track_request(&mut self, encoded_name: &str, data_key: &str, options: Value) {
        self.requested
            .entry(encoded_name.to_owned())
            .or_default()
            .insert(data_key.to_owned(), options);
    }

    /// All tracked request options for a variable, by page key.
    /// Replayed when the backend forces a refresh of that variable.
    pub fn requested_options(&self, encoded_name: &str) -> Vec<(String, Value)> {
        self.requested
            .get(encoded_name)
            .map(|keys| {
                keys.iter()
                    .map(|(key, options)| (key.clone(), options.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn forget_request(&mut self, encoded_name: &str, data_key: &str) {
        if let Some(keys) = self.requested.get_mut(encoded_name) {
            keys.remove(data_key);
            if keys.is_empty() {
                self.requested.remove(encoded_name);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(entries: &[(&str, Value)]) -> ModuleData {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn init_reports_delta() {
        let mut manager = DataManager::new(tree(&[("a", json!(1)), ("b", json!(2))]));
        let changes = manager
            .init(tree(&[("a", json!(1)), ("b", json!(3)), ("c", json!(4))]))
            .unwrap();
        assert_eq!(
            changes,
            ModuleChanges {
                added: vec!["c".to_owned()],
                removed: vec![],
                changed: vec!["b".to_owned()],
            }
        );

        let changes = manager.init(tree(&[("b", json!(3))])).unwrap();
        assert_eq!(changes.removed, vec!["a".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn init_with_identical_tree_is_silent() {
        let mut manager = DataManager::new(tree(&[("a", json!(1))]));
        assert!(manager.init(tree(&[("a", json!(1))])).is_none());
    }

    #[test]
    fn scoped_update_nests_under_data_key() {
        let mut manager = DataManager::new(ModuleData::new());
        manager.update("tbl", json!({"data": [1]}), Some("0-99"));
        assert_eq!(manager.get("tbl").unwrap()["0-99"], json!({"data": [1]}));

        manager.update("tbl", json!({"data": [2]}), Some("100-199"));
        assert_eq!(manager.get("tbl").unwrap()["0-99"], json!({"data": [1]}));
    }

    #[test]
    fn tracked_requests_replay_and_forget() {
        let mut manager = DataManager::new(ModuleData::new());
        manager.track_request("tbl", "0-99", json!({"start": 0, "end": 99}));
        manager.track_request("tbl", "100-199", json!({"start": 100, "end": 199}));

        let options = manager.requested_options("tbl");
        assert_eq!(options.len(), 2);

        manager.forget_request("tbl", "0-99");
        manager.forget_request("tbl", "100-199");
        assert!(manager.requested_options("tbl").is_empty());
    }

    #[test]
    fn requested_data_key_comes_from_pagekey() {
        assert_eq!(
            get_requested_data_key(&json!({"pagekey": "0-99"})).as_deref(),
            Some("0-99")
        );
        assert!(get_requested_data_key(&json!({"value": 1})).is_none());
    }
}
