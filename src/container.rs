//! Container model and its descriptor file.
//!
//! Fields are read-only from outside the crate; every mutation goes through
//! [`ContainerField`] so the registry can pair it with a descriptor rewrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, IoResultExt, Result};
use crate::fs_utils::write_atomic;
use crate::paths::DESCRIPTOR_FILE_NAME;

/// UUID reserved for the default container
pub const DEFAULT_CONTAINER_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Display name given to the default container
pub const DEFAULT_CONTAINER_NAME: &str = "DEFAULT";

/// One profile of the host application's on-disk state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_activated_date: Option<DateTime<Utc>>,
    #[serde(default)]
    activated_count: u64,
}

impl Container {
    pub(crate) fn new(uuid: String, name: Option<String>, description: Option<String>) -> Self {
        Self {
            name,
            uuid,
            description,
            created_at: Utc::now(),
            last_activated_date: None,
            activated_count: 0,
        }
    }

    /// The built-in container holding the state that predates any swapping
    pub(crate) fn default_container() -> Self {
        Self::new(
            DEFAULT_CONTAINER_UUID.to_string(),
            Some(DEFAULT_CONTAINER_NAME.to_string()),
            None,
        )
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activated_date(&self) -> Option<DateTime<Utc>> {
        self.last_activated_date
    }

    pub fn activated_count(&self) -> u64 {
        self.activated_count
    }

    pub fn is_default(&self) -> bool {
        self.uuid == DEFAULT_CONTAINER_UUID
    }

    /// Name for display, falling back to the uuid
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uuid)
    }

    pub(crate) fn apply(&mut self, field: ContainerField) {
        match field {
            ContainerField::Name(name) => self.name = name,
            ContainerField::Description(description) => self.description = description,
            ContainerField::LastActivatedDate(date) => self.last_activated_date = date,
            ContainerField::ActivatedCount(count) => self.activated_count = count,
        }
    }

    /// Read the descriptor stored at the root of an archive slot
    pub fn read(container_dir: &Path) -> Result<Self> {
        let path = container_dir.join(DESCRIPTOR_FILE_NAME);
        let content = fs::read_to_string(&path).at("read descriptor", &path)?;
        serde_json::from_str(&content).map_err(|source| Error::Descriptor { path, source })
    }

    /// Rewrite the whole descriptor file
    pub fn write(&self, container_dir: &Path) -> Result<()> {
        let path = container_dir.join(DESCRIPTOR_FILE_NAME);
        let content = serde_json::to_string_pretty(self).map_err(|source| Error::Descriptor {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, content.as_bytes())
    }
}

/// One mutable container field together with its new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerField {
    Name(Option<String>),
    Description(Option<String>),
    LastActivatedDate(Option<DateTime<Utc>>),
    ActivatedCount(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_container() {
        let container = Container::default_container();
        assert!(container.is_default());
        assert_eq!(container.name(), Some("DEFAULT"));
        assert_eq!(container.activated_count(), 0);
        assert!(container.last_activated_date().is_none());
    }

    #[test]
    fn test_apply_field() {
        let mut container = Container::new("u".to_string(), None, None);
        container.apply(ContainerField::Name(Some("work".to_string())));
        container.apply(ContainerField::ActivatedCount(3));
        assert_eq!(container.name(), Some("work"));
        assert_eq!(container.display_name(), "work");
        assert_eq!(container.activated_count(), 3);

        container.apply(ContainerField::Name(None));
        assert_eq!(container.display_name(), "u");
    }

    #[test]
    fn test_descriptor_uses_camel_case_keys() {
        let mut container = Container::new("u".to_string(), Some("n".to_string()), None);
        container.apply(ContainerField::LastActivatedDate(Some(Utc::now())));

        let json: serde_json::Value = serde_json::to_value(&container).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("lastActivatedDate").is_some());
        assert_eq!(json["activatedCount"], 0);
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_descriptor_read_write() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("slot");
        let container = Container::new(
            "abc".to_string(),
            Some("work".to_string()),
            Some("office setup".to_string()),
        );
        container.write(&dir).unwrap();

        let read = Container::read(&dir).unwrap();
        assert_eq!(read, container);
    }

    #[test]
    fn test_descriptor_missing_count_defaults_to_zero() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(DESCRIPTOR_FILE_NAME),
            r#"{"uuid":"x","createdAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let read = Container::read(temp.path()).unwrap();
        assert_eq!(read.uuid(), "x");
        assert_eq!(read.activated_count(), 0);
        assert!(read.name().is_none());
    }

    #[test]
    fn test_corrupt_descriptor_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(DESCRIPTOR_FILE_NAME), "not json").unwrap();
        assert!(matches!(
            Container::read(temp.path()),
            Err(Error::Descriptor { .. })
        ));
    }
}
