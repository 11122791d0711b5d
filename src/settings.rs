use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::container::DEFAULT_CONTAINER_UUID;
use crate::error::{Error, Result};
use crate::fs_utils::write_atomic;

/// Settings stored in <archive>/appcontainer.settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// UUID of the container whose content occupies the working tree
    #[serde(rename = "currentContainerUUID")]
    pub current_container_uuid: String,
    /// Set while a swap into this container is half done: the outgoing
    /// content is already stashed and the incoming content is being promoted.
    #[serde(
        rename = "pendingContainerUUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_container_uuid: Option<String>,
}

impl ContainerSettings {
    pub fn active(uuid: impl Into<String>) -> Self {
        Self {
            current_container_uuid: uuid.into(),
            pending_container_uuid: None,
        }
    }

    /// Container whose content the working tree holds (or partly holds)
    pub fn working_tree_owner(&self) -> &str {
        self.pending_container_uuid
            .as_deref()
            .unwrap_or(&self.current_container_uuid)
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self::active(DEFAULT_CONTAINER_UUID)
    }
}

/// Durable record of the active container.
///
/// Nothing is cached: every read goes to disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file. Missing or unreadable files yield `None`.
    pub fn load(&self) -> Option<ContainerSettings> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt settings file");
                None
            }
        }
    }

    /// Stored settings, or the defaults when missing or unreadable
    pub fn load_or_default(&self) -> ContainerSettings {
        self.load().unwrap_or_default()
    }

    /// UUID of the active container, the default container when unset
    pub fn current_uuid(&self) -> String {
        self.load_or_default().current_container_uuid
    }

    /// Replace the settings file atomically
    pub fn save(&self, settings: &ContainerSettings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings).map_err(|source| Error::Descriptor {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = ContainerSettings::default();
        assert_eq!(settings.current_container_uuid, DEFAULT_CONTAINER_UUID);
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("nonexistent.json"));
        assert!(store.load().is_none());
        assert_eq!(store.current_uuid(), DEFAULT_CONTAINER_UUID);
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ broken").unwrap();

        let store = SettingsStore::new(&path);
        assert!(store.load().is_none());
        assert_eq!(store.current_uuid(), DEFAULT_CONTAINER_UUID);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("archive/settings.json"));

        let settings = ContainerSettings::active("work");
        store.save(&settings).unwrap();
        assert_eq!(store.load(), Some(settings));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("currentContainerUUID"));
        assert!(!raw.contains("pendingContainerUUID"));
    }

    #[test]
    fn test_pending_swap_owns_the_working_tree() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));
        std::fs::write(
            store.path(),
            r#"{"currentContainerUUID":"a","pendingContainerUUID":"b"}"#,
        )
        .unwrap();

        let settings = store.load_or_default();
        assert_eq!(store.current_uuid(), "a");
        assert_eq!(settings.working_tree_owner(), "b");
        assert_eq!(ContainerSettings::active("a").working_tree_owner(), "a");
    }
}
