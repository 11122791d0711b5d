//! Test utilities shared across test modules
//!
//! Builds a working tree plus archive inside a temporary directory, seeds
//! files, and provides a preference bridge that records every call.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::Result;
use crate::paths::{ARCHIVE_DIR_NAME, DESCRIPTOR_FILE_NAME, LOCK_FILE_NAME, Paths};
use crate::preferences::PreferenceSync;

/// Create a Paths struct rooted at `<temp>/home` with the default archive layout
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    let paths = Paths::for_home(temp_dir.path().join("home"));
    fs::create_dir_all(&paths.home_dir).unwrap();
    paths
}

/// Write a file, creating its parent directories
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Read a file to a string
pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Every regular file below `root` with its content, skipping the archive
/// folder, descriptors and the lock file. Directories are not recorded.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ARCHIVE_DIR_NAME)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name() != DESCRIPTOR_FILE_NAME && e.file_name() != LOCK_FILE_NAME)
        .map(|e| {
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                read_file(e.path()),
            )
        })
        .collect()
}

/// Every regular file below `root` with its content, nothing skipped
pub fn snapshot_raw(root: &Path) -> BTreeMap<PathBuf, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                read_file(e.path()),
            )
        })
        .collect()
}

/// Preference bridge that records each call in order
#[derive(Clone, Default)]
pub struct RecordingPreferences {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingPreferences {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PreferenceSync for RecordingPreferences {
    fn export_to_files(&self) -> Result<()> {
        self.calls.lock().unwrap().push("export".to_string());
        Ok(())
    }

    fn invalidate_cache(&self, namespaces: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("invalidate:{}", namespaces.join(",")));
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.calls.lock().unwrap().push("reload".to_string());
        Ok(())
    }

    fn default_namespace(&self) -> Option<String> {
        Some("com.example.host".to_string())
    }
}
