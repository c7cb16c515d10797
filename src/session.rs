//! Session persistence: the only channel between pipeline phases.
//!
//! The three phases of a flow are independent page loads, not one long-lived
//! process, so the working set and job result travel through a string-only
//! key/value store scoped to the session. The store is a port: the pipeline
//! depends on the [`SessionStore`] trait and any backing — in-memory for
//! tests, file-backed for the CLI, a browser's `sessionStorage` behind a
//! wasm shim — can be injected.
//!
//! Capacity is finite and unenforced here; callers keep working sets within
//! practical limits (tens of MB). An absent *or corrupt* key signals "no
//! active session": [`load`] folds both into
//! [`PipelineError::SessionMissing`], and every Preview/Download page treats
//! that as a hard redirect to Intake rather than a partial render.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// String-only key/value storage scoped to one session.
pub trait SessionStore: Send + Sync {
    fn save_raw(&self, key: &str, value: String) -> Result<(), PipelineError>;
    fn load_raw(&self, key: &str) -> Result<Option<String>, PipelineError>;
    fn clear(&self, key: &str) -> Result<(), PipelineError>;
}

/// Serialise and store a value under `key`.
pub fn save<T: Serialize>(
    store: &dyn SessionStore,
    key: &str,
    value: &T,
) -> Result<(), PipelineError> {
    let json = serde_json::to_string(value).map_err(|e| PipelineError::Storage {
        detail: format!("serialise '{key}': {e}"),
    })?;
    debug!(key, bytes = json.len(), "session save");
    store.save_raw(key, json)
}

/// Load and parse the value under `key`.
///
/// Absent and unparsable keys are the same condition from the caller's point
/// of view — no usable session — so both return
/// [`PipelineError::SessionMissing`]. Corruption is logged before being
/// folded in.
pub fn load<T: DeserializeOwned>(store: &dyn SessionStore, key: &str) -> Result<T, PipelineError> {
    let raw = store
        .load_raw(key)?
        .ok_or_else(|| PipelineError::SessionMissing { key: key.to_string() })?;
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(key, error = %e, "session value is unparsable, treating as missing");
            Err(PipelineError::SessionMissing { key: key.to_string() })
        }
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// A process-local store, for tests and single-shot embedding.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        MemorySessionStore::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned lock only means another thread panicked mid-write;
        // the map itself is still a valid string map.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn save_raw(&self, key: &str, value: String) -> Result<(), PipelineError> {
        self.slots().insert(key.to_string(), value);
        Ok(())
    }

    fn load_raw(&self, key: &str) -> Result<Option<String>, PipelineError> {
        Ok(self.slots().get(key).cloned())
    }

    fn clear(&self, key: &str) -> Result<(), PipelineError> {
        self.slots().remove(key);
        Ok(())
    }
}

// ── File-backed store ────────────────────────────────────────────────────

/// A store persisting each key as a JSON file in one directory, so a flow
/// survives process restarts the way a browser session survives page loads.
///
/// Writes are atomic (temp file + rename) — a crash mid-save leaves the old
/// value intact, never a truncated one.
#[derive(Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::Storage {
            detail: format!("create session dir '{}': {e}", dir.display()),
        })?;
        Ok(FileSessionStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are tool-scoped identifiers like "uploadedPDFs"; anything
        // outside the safe set is escaped so a key can never traverse paths.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn save_raw(&self, key: &str, value: String) -> Result<(), PipelineError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| PipelineError::Storage {
            detail: format!("write '{}': {e}", tmp.display()),
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| PipelineError::Storage {
            detail: format!("rename '{}': {e}", path.display()),
        })
    }

    fn load_raw(&self, key: &str) -> Result<Option<String>, PipelineError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Storage {
                detail: format!("read '{key}': {e}"),
            }),
        }
    }

    fn clear(&self, key: &str) -> Result<(), PipelineError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Storage {
                detail: format!("clear '{key}': {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileEntry, WorkingSet};

    fn sample_set() -> WorkingSet {
        let mut ws = WorkingSet::new();
        let mut a = FileEntry::new("a.pdf", "application/pdf", (0u8..=255).collect());
        a.thumbnail = Some(vec![1, 2, 3]);
        a.page_count = Some(4);
        ws.push(a);
        ws.push(FileEntry::new("b.pdf", "application/pdf", b"%PDF-1.7".to_vec()));
        ws
    }

    fn assert_round_trip(store: &dyn SessionStore) {
        let ws = sample_set();
        save(store, "uploadedPDFs", &ws).expect("save");
        let back: WorkingSet = load(store, "uploadedPDFs").expect("load");
        assert_eq!(back, ws, "ids, names, sizes, payload bytes must survive");
    }

    #[test]
    fn memory_store_round_trips_a_working_set() {
        assert_round_trip(&MemorySessionStore::new());
    }

    #[test]
    fn file_store_round_trips_a_working_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path()).expect("store");
        assert_round_trip(&store);
    }

    #[test]
    fn absent_key_is_session_missing() {
        let store = MemorySessionStore::new();
        let err = load::<WorkingSet>(&store, "uploadedPDFs").unwrap_err();
        assert!(err.redirects_to_intake());
    }

    #[test]
    fn corrupt_value_is_session_missing() {
        let store = MemorySessionStore::new();
        store
            .save_raw("uploadedPDFs", "{not json".to_string())
            .expect("save");
        let err = load::<WorkingSet>(&store, "uploadedPDFs").unwrap_err();
        assert!(matches!(err, PipelineError::SessionMissing { .. }));
    }

    #[test]
    fn clear_removes_the_slot() {
        let store = MemorySessionStore::new();
        save(&store, "mergeResult", &sample_set()).expect("save");
        store.clear("mergeResult").expect("clear");
        assert!(load::<WorkingSet>(&store, "mergeResult").is_err());
        // Clearing an absent key is not an error.
        store.clear("mergeResult").expect("clear again");
    }

    #[test]
    fn file_store_escapes_unsafe_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path()).expect("store");
        store
            .save_raw("../escape/attempt", "{}".to_string())
            .expect("save");
        let loaded = store.load_raw("../escape/attempt").expect("load");
        assert_eq!(loaded.as_deref(), Some("{}"));
        assert!(
            !dir.path().parent().map(|p| p.join("escape").exists()).unwrap_or(false),
            "key must not traverse out of the store directory"
        );
    }

    #[test]
    fn file_store_overwrite_is_atomic_replacement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path()).expect("store");
        store.save_raw("k", "first".into()).expect("save");
        store.save_raw("k", "second".into()).expect("save");
        assert_eq!(store.load_raw("k").expect("load").as_deref(), Some("second"));
        // No stray temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
