//! Container registry.
//!
//! Keeps the in-memory list of known containers, backed by one descriptor
//! file per archive slot (`<archive>/<uuid>/appcontainer.descriptor.json`).
//! The registry only manages slots and descriptors; moving content in and
//! out of the working tree is the swap engine's job.

use std::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::categories::Category;
use crate::container::{Container, ContainerField};
use crate::error::{Error, IoResultExt, Result};
use crate::paths::Paths;

#[derive(Debug)]
pub struct ContainerRegistry {
    paths: Paths,
    containers: Vec<Container>,
}

impl ContainerRegistry {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            containers: Vec::new(),
        }
    }

    /// Re-read every descriptor under the archive root.
    ///
    /// Entries with a missing or unreadable descriptor are skipped.
    pub fn load(&mut self) -> Result<&[Container]> {
        self.containers.clear();

        let archive_dir = &self.paths.archive_dir;
        if !archive_dir.exists() {
            return Ok(&self.containers);
        }

        for entry in fs::read_dir(archive_dir).at("read archive", archive_dir)? {
            let entry = entry.at("read archive entry", archive_dir)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            match Container::read(&path) {
                Ok(container) => {
                    // The slot name is the uuid; a mismatch means a copied or renamed slot.
                    if entry.file_name().to_str() != Some(container.uuid()) {
                        warn!(path = %path.display(), uuid = container.uuid(), "skipping slot whose descriptor names another container");
                        continue;
                    }
                    self.containers.push(container);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping archive entry without a readable descriptor");
                }
            }
        }

        self.containers
            .sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.uuid().cmp(b.uuid())));
        debug!(count = self.containers.len(), "loaded containers");
        Ok(&self.containers)
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn get(&self, uuid: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.uuid() == uuid)
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Create a new container with a random uuid and an empty archive slot
    pub fn create(&mut self, name: Option<String>, description: Option<String>) -> Result<Container> {
        let container = Container::new(Uuid::new_v4().to_string(), name, description);
        self.insert(container)
    }

    /// Create the default container's slot and descriptor.
    ///
    /// Only the slot is created here; filling it is left to the caller.
    pub fn create_default(&mut self) -> Result<Container> {
        self.insert(Container::default_container())
    }

    fn insert(&mut self, container: Container) -> Result<Container> {
        let dir = self.paths.container_dir(container.uuid());
        fs::create_dir_all(&dir).at("create container directory", &dir)?;
        for category in Category::all() {
            let category_dir = category.dir_in(&dir);
            fs::create_dir_all(&category_dir).at("create category directory", &category_dir)?;
        }

        container.write(&dir)?;

        self.containers.retain(|c| c.uuid() != container.uuid());
        self.containers.push(container.clone());
        info!(uuid = container.uuid(), name = container.display_name(), "created container");
        Ok(container)
    }

    /// Change one field and rewrite the descriptor. Unknown uuids are ignored.
    pub fn update_field(&mut self, uuid: &str, field: ContainerField) -> Result<()> {
        let dir = self.paths.container_dir(uuid);
        let Some(container) = self.containers.iter_mut().find(|c| c.uuid() == uuid) else {
            debug!(uuid, "update for unknown container ignored");
            return Ok(());
        };

        if !dir.is_dir() {
            return Err(Error::ContainerDirectoryNotFound {
                uuid: uuid.to_string(),
                path: dir,
            });
        }

        container.apply(field);
        container.write(&dir)
    }

    /// Remove a container's archive slot and forget it
    pub fn remove(&mut self, uuid: &str) -> Result<()> {
        let dir = self.paths.container_dir(uuid);
        if !dir.exists() {
            return Err(Error::ContainerNotFound {
                uuid: uuid.to_string(),
            });
        }

        fs::remove_dir_all(&dir).at("remove container directory", &dir)?;
        self.containers.retain(|c| c.uuid() != uuid);
        info!(uuid, "deleted container");
        Ok(())
    }

    /// Forget every container without touching the disk
    pub fn clear(&mut self) {
        self.containers.clear();
    }
}
