//! Container swapping.
//!
//! This module implements the core mechanism of appcontainer: moving a
//! container's content between its archive slot and the working tree.
//!
//! Activation order is fixed:
//! 1. flush the preference cache to disk
//! 2. stash the working tree into the slot of the container that owns it
//! 3. record the incoming uuid as pending in the settings file
//! 4. invalidate the preference cache
//! 5. promote the incoming container into the working tree
//! 6. reload preferences
//! 7. record the incoming uuid as active and drop the pending entry
//! 8. bump the incoming container's activation metadata
//!
//! The stash always finishes before anything is written into the working
//! tree, and moves never delete their destination. A swap that stops during
//! the stash leaves the working tree owned by the outgoing container, so a
//! re-run stashes the rest. A swap that stops during the promote leaves the
//! pending entry naming the new owner: re-running the same activation only
//! finishes the promote, while any other activation first pushes the partial
//! content back into the pending container's slot.

use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::categories::Category;
use crate::container::{Container, ContainerField, DEFAULT_CONTAINER_UUID};
use crate::error::{Error, IoResultExt, Result};
use crate::fs_utils::{copy_children, move_children, remove_children};
use crate::observer::ObserverHub;
use crate::paths::Paths;
use crate::preferences::{PreferenceSync, discover_namespaces};
use crate::registry::ContainerRegistry;
use crate::settings::{ContainerSettings, SettingsStore};

/// Owns the registry, settings, preference bridge and observers for one
/// working tree. Not safe to drive from two callers at once.
pub struct SwapEngine {
    paths: Paths,
    registry: ContainerRegistry,
    settings: SettingsStore,
    preferences: Box<dyn PreferenceSync>,
    observers: ObserverHub,
    initialized: bool,
}

impl SwapEngine {
    pub fn new(paths: Paths, preferences: impl PreferenceSync + 'static) -> Self {
        Self {
            registry: ContainerRegistry::new(paths.clone()),
            settings: SettingsStore::new(paths.settings_file.clone()),
            preferences: Box::new(preferences),
            observers: ObserverHub::new(),
            initialized: false,
            paths,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.observers
    }

    /// Create the archive and the default container on first use.
    ///
    /// The first time no default slot exists, the current working tree is
    /// moved into it so nothing that predates the archive is lost.
    pub fn ensure_initialized(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        self.paths.ensure_dirs()?;
        self.registry.load()?;

        let default_dir = self.paths.container_dir(DEFAULT_CONTAINER_UUID);
        if !default_dir.exists() {
            info!(home = %self.paths.home_dir.display(), "creating default container from working tree");
            self.registry.create_default()?;
            self.move_categories(&self.paths.home_dir, &default_dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    /// All known containers
    pub fn containers(&mut self) -> Result<&[Container]> {
        self.ensure_initialized()?;
        Ok(self.registry.containers())
    }

    pub fn container(&mut self, uuid: &str) -> Result<Option<Container>> {
        self.ensure_initialized()?;
        Ok(self.registry.get(uuid).cloned())
    }

    /// UUID recorded as active, read fresh from disk
    pub fn active_uuid(&self) -> String {
        self.settings.current_uuid()
    }

    pub fn active_container(&mut self) -> Result<Option<Container>> {
        self.ensure_initialized()?;
        Ok(self.registry.get(&self.active_uuid()).cloned())
    }

    pub fn is_active(&self, container: &Container) -> bool {
        container.uuid() == self.active_uuid()
    }

    /// Whether the working tree holds this container's content. Differs from
    /// `is_active` only while a swap is pending.
    pub fn owns_working_tree(&self, container: &Container) -> bool {
        container.uuid() == self.settings.load_or_default().working_tree_owner()
    }

    /// Where a container's content currently lives
    pub fn content_dir(&self, container: &Container) -> PathBuf {
        if self.owns_working_tree(container) {
            self.paths.home_dir.clone()
        } else {
            self.paths.container_dir(container.uuid())
        }
    }

    /// Every location holding part of a container's content, slot first.
    ///
    /// The working tree's owner can also have content parked in its slot:
    /// right after first use, after `stash`, or mid-swap.
    pub fn content_roots(&self, container: &Container) -> Vec<PathBuf> {
        let slot = self.paths.container_dir(container.uuid());
        if !self.owns_working_tree(container) {
            return vec![slot];
        }

        let mut roots = Vec::with_capacity(2);
        if slot.is_dir() {
            roots.push(slot);
        }
        roots.push(self.paths.home_dir.clone());
        roots
    }

    pub fn create_container(
        &mut self,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Container> {
        self.ensure_initialized()?;
        self.registry.create(name, description)
    }

    /// Change one field of a container and persist it
    pub fn update_container(&mut self, uuid: &str, field: ContainerField) -> Result<()> {
        self.ensure_initialized()?;
        self.registry.update_field(uuid, field)
    }

    /// Activate a container by uuid. Unknown uuids are ignored.
    pub fn activate_container(&mut self, uuid: &str) -> Result<()> {
        self.ensure_initialized()?;
        let Some(target) = self.registry.get(uuid).cloned() else {
            debug!(uuid, "activation of unknown container ignored");
            return Ok(());
        };
        self.activate(&target)
    }

    /// Make `target` the live container
    pub fn activate(&mut self, target: &Container) -> Result<()> {
        self.ensure_initialized()?;

        let target = self.registered(target.uuid())?;
        let settings = self.settings.load_or_default();
        let from_uuid = settings.current_container_uuid.clone();
        let owner_uuid = settings.working_tree_owner().to_string();
        if target.uuid() == from_uuid && settings.pending_container_uuid.is_none() {
            debug!(uuid = target.uuid(), "container already active");
            return Ok(());
        }

        let target_dir = self.paths.container_dir(target.uuid());
        if !target_dir.is_dir() {
            return Err(Error::ContainerDirectoryNotFound {
                uuid: target.uuid().to_string(),
                path: target_dir,
            });
        }

        let from = self.registry.get(&from_uuid).cloned();
        info!(from = %from_uuid, to = target.uuid(), "activating container");
        self.observers.will_change(from.as_ref(), &target);

        self.preferences.export_to_files()?;
        let namespaces = self.namespaces_for(&target_dir);

        if owner_uuid == target.uuid() {
            info!(uuid = target.uuid(), "resuming interrupted swap");
        } else {
            match self.registry.get(&owner_uuid).cloned() {
                Some(owner) => self.stash_container(&owner)?,
                None => {
                    warn!(uuid = %owner_uuid, "working tree owner is not registered; nothing to stash")
                }
            }
        }

        self.settings.save(&ContainerSettings {
            current_container_uuid: from_uuid,
            pending_container_uuid: Some(target.uuid().to_string()),
        })?;

        self.preferences.invalidate_cache(&namespaces)?;
        self.move_categories(&target_dir, &self.paths.home_dir)?;
        self.preferences.reload()?;

        self.settings.save(&ContainerSettings::active(target.uuid()))?;

        self.registry.update_field(
            target.uuid(),
            ContainerField::ActivatedCount(target.activated_count() + 1),
        )?;
        self.registry
            .update_field(target.uuid(), ContainerField::LastActivatedDate(Some(Utc::now())))?;

        let target = self.registered(target.uuid())?;
        self.observers.did_change(from.as_ref(), &target);
        info!(uuid = target.uuid(), "container active");
        Ok(())
    }

    /// Move the active container's content into its slot and leave the
    /// working tree empty. The active uuid is unchanged.
    pub fn stash(&mut self) -> Result<()> {
        self.ensure_initialized()?;

        let uuid = self.active_uuid();
        let Some(container) = self.registry.get(&uuid).cloned() else {
            warn!(uuid = %uuid, "active container is not registered; nothing to stash");
            return Ok(());
        };

        self.preferences.export_to_files()?;
        let namespaces = self.namespaces_for(&self.paths.container_dir(&uuid));
        self.settle_pending()?;
        self.stash_container(&container)?;
        self.preferences.invalidate_cache(&namespaces)
    }

    /// Move the active container's archived content back into the working tree
    pub fn unstash(&mut self) -> Result<()> {
        self.ensure_initialized()?;

        let uuid = self.active_uuid();
        let container = self.registered(&uuid)?;
        let dir = self.paths.container_dir(container.uuid());
        if !dir.is_dir() {
            return Err(Error::ContainerDirectoryNotFound { uuid, path: dir });
        }

        let namespaces = self.namespaces_for(&dir);
        self.settle_pending()?;
        self.preferences.invalidate_cache(&namespaces)?;
        info!(uuid = container.uuid(), "restoring stashed content");
        self.move_categories(&dir, &self.paths.home_dir)?;
        self.preferences.reload()
    }

    /// Create a new container holding a copy of `source`'s content.
    /// The copy is not activated.
    pub fn clone_container(
        &mut self,
        source: &Container,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Container> {
        self.ensure_initialized()?;

        let source = self.registered(source.uuid())?;
        let roots = self.existing_content_roots(&source)?;

        if self.owns_working_tree(&source) {
            self.preferences.export_to_files()?;
        }

        let clone = self.registry.create(name, description)?;
        let clone_dir = self.paths.container_dir(clone.uuid());
        info!(source = source.uuid(), clone = clone.uuid(), "cloning container");
        // Later roots win, so the working tree overrides parked copies.
        for root in &roots {
            for category in Category::all() {
                copy_children(
                    &category.dir_in(root),
                    &category.dir_in(&clone_dir),
                    &self.paths.excludes_for(category),
                )?;
            }
        }
        Ok(clone)
    }

    /// Delete a container's content wherever it currently lives
    pub fn clean_container(&mut self, target: &Container) -> Result<()> {
        self.ensure_initialized()?;

        let target = self.registered(target.uuid())?;
        let roots = self.existing_content_roots(&target)?;

        let namespaces = self.namespaces_for(&self.paths.container_dir(target.uuid()));
        for root in &roots {
            info!(uuid = target.uuid(), dir = %root.display(), "cleaning container");
            for category in Category::all() {
                remove_children(&category.dir_in(root), &self.paths.excludes_for(category))?;
            }
        }

        if self.owns_working_tree(&target) {
            self.preferences.invalidate_cache(&namespaces)?;
            self.preferences.reload()?;
        }
        Ok(())
    }

    /// Delete a container. The active container is swapped out for the
    /// default container first.
    pub fn delete_container(&mut self, uuid: &str) -> Result<()> {
        self.ensure_initialized()?;

        if uuid == DEFAULT_CONTAINER_UUID {
            return Err(Error::DefaultContainerProtected);
        }
        if !self.paths.container_dir(uuid).exists() {
            return Err(Error::ContainerNotFound {
                uuid: uuid.to_string(),
            });
        }

        let settings = self.settings.load_or_default();
        if settings.current_container_uuid == uuid || settings.working_tree_owner() == uuid {
            self.activate_container(DEFAULT_CONTAINER_UUID)?;
        }

        self.registry.remove(uuid)
    }

    /// Activate the default container and delete the whole archive,
    /// including every other container. Irreversible.
    ///
    /// Content the default container has parked in its slot is moved back
    /// into the working tree before the archive goes.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.activate_container(DEFAULT_CONTAINER_UUID)?;
        if self.paths.container_dir(DEFAULT_CONTAINER_UUID).is_dir() {
            self.unstash()?;
        }

        let archive_dir = &self.paths.archive_dir;
        if archive_dir.exists() {
            fs::remove_dir_all(archive_dir).at("remove archive", archive_dir)?;
        }
        warn!(archive = %archive_dir.display(), "archive reset");

        self.registry.clear();
        self.initialized = false;
        Ok(())
    }

    fn registered(&self, uuid: &str) -> Result<Container> {
        self.registry
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::ContainerNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// `content_roots`, failing when a root is missing
    fn existing_content_roots(&self, container: &Container) -> Result<Vec<PathBuf>> {
        let roots = self.content_roots(container);
        if let Some(missing) = roots.iter().find(|root| !root.is_dir()) {
            return Err(Error::ContainerDirectoryNotFound {
                uuid: container.uuid().to_string(),
                path: missing.clone(),
            });
        }
        Ok(roots)
    }

    /// Push the content of a half-promoted container back into its slot and
    /// drop the pending entry. The recorded active uuid is kept.
    fn settle_pending(&mut self) -> Result<()> {
        let settings = self.settings.load_or_default();
        let Some(pending) = settings.pending_container_uuid else {
            return Ok(());
        };

        if pending != settings.current_container_uuid {
            match self.registry.get(&pending).cloned() {
                Some(container) => {
                    info!(uuid = %pending, "returning half-promoted content to its slot");
                    self.stash_container(&container)?;
                }
                None => warn!(uuid = %pending, "pending container is not registered"),
            }
        }
        self.settings
            .save(&ContainerSettings::active(settings.current_container_uuid))
    }

    fn stash_container(&self, container: &Container) -> Result<()> {
        let dir = self.paths.container_dir(container.uuid());
        debug!(uuid = container.uuid(), "stashing working tree");
        self.move_categories(&self.paths.home_dir, &dir)
    }

    fn move_categories(&self, src_root: &Path, dst_root: &Path) -> Result<()> {
        for category in Category::all() {
            debug!(
                category = category.relative_path(),
                from = %src_root.display(),
                to = %dst_root.display(),
                "moving category"
            );
            move_children(
                &category.dir_in(src_root),
                &category.dir_in(dst_root),
                &self.paths.excludes_for(category),
            )?;
        }
        Ok(())
    }

    /// Preference namespaces touched by swapping the working tree with
    /// `incoming_dir`: those present now, those arriving, and the default.
    fn namespaces_for(&self, incoming_dir: &Path) -> Vec<String> {
        let mut namespaces: BTreeSet<String> =
            discover_namespaces(&Category::LibraryPreferences.dir_in(&self.paths.home_dir));
        namespaces.extend(discover_namespaces(
            &Category::LibraryPreferences.dir_in(incoming_dir),
        ));
        namespaces.extend(self.preferences.default_namespace());
        namespaces.into_iter().collect()
    }
}

impl std::fmt::Debug for SwapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapEngine")
            .field("paths", &self.paths)
            .field("initialized", &self.initialized)
            .finish()
    }
}
