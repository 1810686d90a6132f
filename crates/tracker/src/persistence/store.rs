#![forbid(unsafe_code)]

use crate::error::Error;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key-path settings storage owned by the host.
///
/// Writes are last-write-wins overwrites; nothing is durable until `save`
/// returns.
pub trait SettingsStore: Send {
    /// Value at `path`, if any.
    fn get(&self, path: &[&str]) -> Option<Value>;
    /// Replace the value at `path`, creating intermediate objects.
    fn set(&mut self, path: &[&str], value: Value);
    /// Make all previous `set`s durable.
    fn save(&mut self) -> Result<(), Error>;
    /// Recursively merge `patch` into the document root.
    fn merge(&mut self, patch: Value);
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(key))
}

fn assign(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for key in parents {
        node = object_mut(node)
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(node).insert(last.to_string(), value);
}

/// Coerce `node` into an object, discarding any scalar in the way.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

/// Objects merge key by key; everything else in `patch` replaces `target`.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    live: Value,
    saved: Value,
    saves: usize,
    fail_saves: bool,
}

/// In-memory store. Clones share the same document, so a test can keep a
/// handle while the tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<MemoryInner>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        let store = Self::default();
        {
            let mut inner = store.0.lock();
            inner.live = document.clone();
            inner.saved = document;
        }
        store
    }

    /// Document as of the last successful `save`.
    pub fn saved(&self) -> Value {
        self.0.lock().saved.clone()
    }

    pub fn saved_at(&self, path: &[&str]) -> Option<Value> {
        lookup(&self.0.lock().saved, path).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.0.lock().saves
    }

    /// Make every following `save` fail, or succeed again.
    pub fn fail_saves(&self, fail: bool) {
        self.0.lock().fail_saves = fail;
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, path: &[&str]) -> Option<Value> {
        lookup(&self.0.lock().live, path).cloned()
    }

    fn set(&mut self, path: &[&str], value: Value) {
        assign(&mut self.0.lock().live, path, value);
    }

    fn save(&mut self) -> Result<(), Error> {
        let mut inner = self.0.lock();
        if inner.fail_saves {
            return Err(Error::Io(std::io::Error::other("memory store rejects saves")));
        }
        inner.saved = inner.live.clone();
        inner.saves += 1;
        Ok(())
    }

    fn merge(&mut self, patch: Value) {
        deep_merge(&mut self.0.lock().live, patch);
    }
}

/// Settings document kept as pretty-printed JSON on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    root: Value,
}

impl JsonFileStore {
    /// Open the document at `path`. A missing file starts empty; an
    /// unreadable one is logged and replaced on the next save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(Error::InvalidPath(path));
        }

        let root = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    warn!(path = %path.display(), "settings document is not an object, starting empty");
                    Value::Object(Map::new())
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "settings document is corrupt, starting empty");
                    Value::Object(Map::new())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(Self { path, root })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, path: &[&str]) -> Option<Value> {
        lookup(&self.root, path).cloned()
    }

    fn set(&mut self, path: &[&str], value: Value) {
        assign(&mut self.root, path, value);
    }

    fn save(&mut self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, serde_json::to_vec_pretty(&self.root)?)?;
        std::fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "settings persisted");
        Ok(())
    }

    fn merge(&mut self, patch: Value) {
        deep_merge(&mut self.root, patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut store = MemoryStore::new();
        store.set(&["a", "b", "c"], json!(1));
        assert_eq!(store.get(&["a", "b"]), Some(json!({"c": 1})));
        assert_eq!(store.get(&["a", "x"]), None);
    }

    #[test]
    fn set_replaces_scalars_on_the_path() {
        let mut store = MemoryStore::with_document(json!({"a": 5}));
        store.set(&["a", "b"], json!(true));
        assert_eq!(store.get(&[]), Some(json!({"a": {"b": true}})));
    }

    #[test]
    fn memory_store_only_commits_on_save() {
        let mut store = MemoryStore::new();
        let observer = store.clone();
        store.set(&["k"], json!("v"));
        assert_eq!(observer.saved_at(&["k"]), None);

        store.save().unwrap();
        assert_eq!(observer.saved_at(&["k"]), Some(json!("v")));
        assert_eq!(observer.save_count(), 1);

        observer.fail_saves(true);
        store.set(&["k"], json!("w"));
        assert!(store.save().is_err());
        assert_eq!(observer.saved_at(&["k"]), Some(json!("v")));
    }

    #[test]
    fn deep_merge_keeps_untouched_keys() {
        let mut doc = json!({"a": {"x": 1, "y": 2}, "b": [1, 2]});
        deep_merge(&mut doc, json!({"a": {"y": 3}, "b": [9], "c": null}));
        assert_eq!(doc, json!({"a": {"x": 1, "y": 3}, "b": [9], "c": null}));
    }

    #[test]
    fn json_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(&["tool_state"]), None);
        store.set(&["tool_state", "T0"], json!({"accumulated_seconds": 12}));
        store.save().unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(&["tool_state", "T0", "accumulated_seconds"]),
            Some(json!(12))
        );
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(&[]), Some(json!({})));
    }
}
