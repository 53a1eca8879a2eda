//! Durable local storage.
//!
//! The browser runtime keeps a handful of values across page reloads:
//! the client id, the theme and time-zone preferences, and a snapshot of
//! any blocking dialog. This is the Rust counterpart — a small key/value
//! store that is opportunistic and last-write-wins, never transactional.
//! Write failures are logged and swallowed: losing a preference must not
//! take the session down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ── Well-known keys ──────────────────────────────────────────────────

/// Persisted session identifier.
pub const CLIENT_ID_KEY: &str = "PyForgeClientId";
/// Persisted theme mode preference ("light" / "dark").
pub const THEME_KEY: &str = "theme";
/// Persisted time-zone preference.
pub const TIME_ZONE_KEY: &str = "timeZone";
/// Snapshot of a blocking dialog, kept while the page is hidden.
pub const BLOCK_KEY: &str = "PyForgeBlockUi";

// ── Trait ────────────────────────────────────────────────────────────

/// String key/value storage that survives the session.
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Read a stored value, falling back to `default` when absent or when
/// the stored value is not in `allowed` (empty `allowed` means any).
pub fn get_value_in(
    storage: &dyn DurableStorage,
    key: &str,
    default: &str,
    allowed: &[&str],
) -> String {
    match storage.get(key) {
        Some(val) if !val.is_empty() && (allowed.is_empty() || allowed.contains(&val.as_str())) => {
            val
        }
        _ => default.to_owned(),
    }
}

// ── File-backed implementation ───────────────────────────────────────

/// File-backed storage: one JSON object per application, rewritten on
/// every mutation. Cheap because the value set is tiny (four keys).
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the store under `dir`.
    ///
    /// An unreadable or corrupt file starts the store empty rather than
    /// failing — stored preferences are conveniences, not state of record.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join("storage.json");
        let cache = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<HashMap<String, String>>(&text).ok())
            .unwrap_or_default();
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    fn flush(&self, cache: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "cannot create storage directory");
                return;
            }
        }
        match serde_json::to_string_pretty(cache) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    tracing::warn!(error = %e, path = %self.path.display(), "storage write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "storage serialization failed"),
        }
    }

    fn with_cache(&self, f: impl FnOnce(&mut HashMap<String, String>)) {
        if let Ok(mut cache) = self.cache.lock() {
            f(&mut cache);
            self.flush(&cache);
        }
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.with_cache(|cache| {
            cache.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.with_cache(|cache| {
            cache.remove(key);
        });
    }
}

// ── In-memory implementation ─────────────────────────────────────────

/// Volatile storage for tests and embedded use.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.get(CLIENT_ID_KEY).is_none());

        storage.set(CLIENT_ID_KEY, "c-42");
        assert_eq!(storage.get(CLIENT_ID_KEY).as_deref(), Some("c-42"));

        storage.remove(CLIENT_ID_KEY);
        assert!(storage.get(CLIENT_ID_KEY).is_none());
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = FileStorage::open(dir.path());
            storage.set(THEME_KEY, "dark");
            storage.set(TIME_ZONE_KEY, "Europe/Paris");
        }

        let storage = FileStorage::open(dir.path());
        assert_eq!(storage.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(storage.get(TIME_ZONE_KEY).as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn file_storage_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("storage.json"), "not json").unwrap();

        let storage = FileStorage::open(dir.path());
        assert!(storage.get(THEME_KEY).is_none());
        storage.set(THEME_KEY, "light"); // and writes still work
        assert_eq!(storage.get(THEME_KEY).as_deref(), Some("light"));
    }

    #[test]
    fn get_value_in_validates_against_allowed() {
        let storage = MemoryStorage::new();
        storage.set(THEME_KEY, "purple");

        assert_eq!(
            get_value_in(&storage, THEME_KEY, "light", &["light", "dark"]),
            "light"
        );

        storage.set(THEME_KEY, "dark");
        assert_eq!(
            get_value_in(&storage, THEME_KEY, "light", &["light", "dark"]),
            "dark"
        );

        // No allow-list: anything non-empty wins.
        storage.set(THEME_KEY, "purple");
        assert_eq!(get_value_in(&storage, THEME_KEY, "light", &[]), "purple");
    }
}
