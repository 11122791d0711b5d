//! Preference sync bridge.
//!
//! Hosts often keep preferences in a process-wide in-memory cache that is
//! only periodically written to disk. Before a swap the cache has to be
//! flushed so the files can move with the container; afterwards it has to
//! forget what it holds so the next read sees the incoming container's files.
//!
//! [`NoopPreferences`] is for hosts without such a cache. With it, preference
//! data that lives only in memory is not scoped to a container.
//! [`JsonPreferences`] is a small cache backed by one JSON file per namespace.

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::fs_utils::write_atomic;

/// Contract the swap engine requires of the host's preference subsystem
pub trait PreferenceSync {
    /// Write every in-memory preference to its namespace file on disk
    fn export_to_files(&self) -> Result<()>;

    /// Forget cached values so later reads come from disk
    fn invalidate_cache(&self, namespaces: &[String]) -> Result<()>;

    /// Re-read preferences from disk
    fn reload(&self) -> Result<()>;

    /// The host's own namespace, always included in invalidation
    fn default_namespace(&self) -> Option<String> {
        None
    }
}

/// Bridge for hosts without a preference cache
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreferences;

impl PreferenceSync for NoopPreferences {
    fn export_to_files(&self) -> Result<()> {
        Ok(())
    }

    fn invalidate_cache(&self, _namespaces: &[String]) -> Result<()> {
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        Ok(())
    }
}

/// Namespaces with a file in `preferences_dir` (file stem of each regular file)
pub fn discover_namespaces(preferences_dir: &Path) -> BTreeSet<String> {
    let Ok(entries) = fs::read_dir(preferences_dir) else {
        return BTreeSet::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect()
}

type Namespace = Map<String, Value>;

#[derive(Debug)]
struct PreferenceState {
    dir: PathBuf,
    default_namespace: String,
    cache: HashMap<String, Namespace>,
    dirty: HashSet<String>,
}

impl PreferenceState {
    fn file_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    fn read_namespace(&self, namespace: &str) -> Result<Namespace> {
        let path = self.file_for(namespace);
        if !path.exists() {
            return Ok(Namespace::new());
        }
        let content = fs::read_to_string(&path).at("read preferences", &path)?;
        serde_json::from_str(&content).map_err(|source| Error::Descriptor { path, source })
    }

    fn namespace(&mut self, namespace: &str) -> Result<&mut Namespace> {
        if !self.cache.contains_key(namespace) {
            let values = self.read_namespace(namespace)?;
            self.cache.insert(namespace.to_string(), values);
        }
        Ok(self.cache.entry(namespace.to_string()).or_default())
    }
}

/// Preference cache backed by `<dir>/<namespace>.json` files.
///
/// Clones share one cache, so a host can keep a handle while the swap engine
/// owns another.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    state: Arc<Mutex<PreferenceState>>,
}

impl JsonPreferences {
    pub fn new(dir: impl Into<PathBuf>, default_namespace: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PreferenceState {
                dir: dir.into(),
                default_namespace: default_namespace.into(),
                cache: HashMap::new(),
                dirty: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PreferenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let mut state = self.lock();
        Ok(state.namespace(namespace)?.get(key).cloned())
    }

    pub fn set(&self, namespace: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.lock();
        state.namespace(namespace)?.insert(key.to_string(), value);
        state.dirty.insert(namespace.to_string());
        Ok(())
    }

    pub fn remove(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        let mut state = self.lock();
        let removed = state.namespace(namespace)?.remove(key);
        if removed.is_some() {
            state.dirty.insert(namespace.to_string());
        }
        Ok(removed)
    }

    /// Shorthand for `get` in the default namespace
    pub fn get_default(&self, key: &str) -> Result<Option<Value>> {
        let namespace = self.lock().default_namespace.clone();
        self.get(&namespace, key)
    }

    /// Shorthand for `set` in the default namespace
    pub fn set_default(&self, key: &str, value: Value) -> Result<()> {
        let namespace = self.lock().default_namespace.clone();
        self.set(&namespace, key, value)
    }
}

impl PreferenceSync for JsonPreferences {
    fn export_to_files(&self) -> Result<()> {
        let mut state = self.lock();
        let mut dirty: Vec<String> = state.dirty.iter().cloned().collect();
        dirty.sort();

        for namespace in dirty {
            let Some(values) = state.cache.get(&namespace) else {
                continue;
            };
            let path = state.file_for(&namespace);
            let content = serde_json::to_string_pretty(values).map_err(|source| {
                Error::Descriptor {
                    path: path.clone(),
                    source,
                }
            })?;
            write_atomic(&path, content.as_bytes())?;
            state.dirty.remove(&namespace);
            debug!(namespace = %namespace, "exported preferences");
        }
        Ok(())
    }

    fn invalidate_cache(&self, namespaces: &[String]) -> Result<()> {
        let mut state = self.lock();
        for namespace in namespaces {
            if state.dirty.remove(namespace) {
                warn!(namespace = %namespace, "dropping unexported preference changes");
            }
            state.cache.remove(namespace);
        }
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        let mut state = self.lock();
        let cached: Vec<String> = state
            .cache
            .keys()
            .filter(|namespace| !state.dirty.contains(*namespace))
            .cloned()
            .collect();

        for namespace in cached {
            let values = state.read_namespace(&namespace)?;
            state.cache.insert(namespace, values);
        }
        Ok(())
    }

    fn default_namespace(&self) -> Option<String> {
        Some(self.lock().default_namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_file;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_discover_namespaces() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("Preferences");
        write_file(&dir.join("com.example.app.json"), "{}");
        write_file(&dir.join("group.shared.plist"), "");
        fs::create_dir_all(dir.join("subdir")).unwrap();

        let found = discover_namespaces(&dir);
        let expected: BTreeSet<String> = ["com.example.app", "group.shared"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(found, expected);
        assert!(discover_namespaces(&temp.path().join("missing")).is_empty());
    }

    #[test]
    fn test_set_is_memory_only_until_export() {
        let temp = TempDir::new().unwrap();
        let prefs = JsonPreferences::new(temp.path(), "app");

        prefs.set_default("theme", json!("dark")).unwrap();
        assert_eq!(prefs.get_default("theme").unwrap(), Some(json!("dark")));
        assert!(!temp.path().join("app.json").exists());

        prefs.export_to_files().unwrap();
        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("app.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk, json!({"theme": "dark"}));
    }

    #[test]
    fn test_invalidate_then_read_comes_from_disk() {
        let temp = TempDir::new().unwrap();
        let prefs = JsonPreferences::new(temp.path(), "app");
        prefs.set("app", "count", json!(1)).unwrap();
        prefs.export_to_files().unwrap();

        // Files change underneath the cache, as they do during a swap.
        write_file(&temp.path().join("app.json"), r#"{"count": 2}"#);
        assert_eq!(prefs.get("app", "count").unwrap(), Some(json!(1)));

        prefs.invalidate_cache(&["app".to_string()]).unwrap();
        assert_eq!(prefs.get("app", "count").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_reload_refreshes_clean_namespaces() {
        let temp = TempDir::new().unwrap();
        let prefs = JsonPreferences::new(temp.path(), "app");
        assert_eq!(prefs.get("app", "k").unwrap(), None);

        write_file(&temp.path().join("app.json"), r#"{"k": true}"#);
        prefs.reload().unwrap();
        assert_eq!(prefs.get("app", "k").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_clones_share_cache() {
        let temp = TempDir::new().unwrap();
        let prefs = JsonPreferences::new(temp.path(), "app");
        let handle = prefs.clone();
        handle.set_default("x", json!(5)).unwrap();
        assert_eq!(prefs.get_default("x").unwrap(), Some(json!(5)));
        assert_eq!(prefs.remove("app", "x").unwrap(), Some(json!(5)));
        assert_eq!(handle.get_default("x").unwrap(), None);
    }
}
