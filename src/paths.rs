use directories::ProjectDirs;
use std::path::PathBuf;

use crate::categories::Category;
use crate::error::{Error, IoResultExt, Result};

/// Name of the private archive folder inside the working tree's `Library`
pub const ARCHIVE_DIR_NAME: &str = ".__app_container__";

/// Settings file stored at the archive root
pub const SETTINGS_FILE_NAME: &str = "appcontainer.settings.json";

/// Descriptor file stored at the root of each archive slot
pub const DESCRIPTOR_FILE_NAME: &str = "appcontainer.descriptor.json";

/// Advisory lock file stored at the working tree root
pub const LOCK_FILE_NAME: &str = ".appcontainer.lock";

/// All computed paths used by appcontainer
#[derive(Debug, Clone)]
pub struct Paths {
    /// Working tree root that the host application reads and writes
    pub home_dir: PathBuf,
    /// <home>/Library/.__app_container__
    pub archive_dir: PathBuf,
    /// <archive>/appcontainer.settings.json
    pub settings_file: PathBuf,
    /// <home>/.appcontainer.lock
    pub lock_file: PathBuf,
}

impl Paths {
    /// Resolve paths from optional overrides.
    ///
    /// Without a home override the working tree is a sandbox under the
    /// per-user data directory, never the user's real home.
    pub fn new(home: Option<PathBuf>, archive: Option<PathBuf>) -> Result<Self> {
        let home_dir = match home {
            Some(home) => std::path::absolute(&home).at("resolve working tree", &home)?,
            None => ProjectDirs::from("", "", "appcontainer")
                .ok_or(Error::HomeUnavailable)?
                .data_dir()
                .join("home"),
        };

        Ok(match archive {
            Some(archive) => {
                let archive_dir = std::path::absolute(&archive).at("resolve archive", &archive)?;
                Self::with_archive_dir(home_dir, archive_dir)
            }
            None => Self::for_home(home_dir),
        })
    }

    /// Paths for a working tree with the archive at its default location
    pub fn for_home(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        let archive_dir = home_dir.join("Library").join(ARCHIVE_DIR_NAME);
        Self::with_archive_dir(home_dir, archive_dir)
    }

    /// Paths for a working tree with an explicit archive root
    pub fn with_archive_dir(home_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        let archive_dir = archive_dir.into();
        Self {
            settings_file: archive_dir.join(SETTINGS_FILE_NAME),
            lock_file: home_dir.join(LOCK_FILE_NAME),
            home_dir,
            archive_dir,
        }
    }

    /// Archive slot of a container
    pub fn container_dir(&self, uuid: &str) -> PathBuf {
        self.archive_dir.join(uuid)
    }

    /// Descriptor file of a container
    pub fn descriptor_file(&self, uuid: &str) -> PathBuf {
        self.container_dir(uuid).join(DESCRIPTOR_FILE_NAME)
    }

    /// Excludes for moving, copying or clearing `category` under this layout.
    ///
    /// When the archive root sits inside the category's working tree
    /// directory, the root itself is excluded as well as the default
    /// archive folder name.
    pub fn excludes_for(&self, category: Category) -> Vec<String> {
        let mut excludes = category.excludes();
        if self.archive_dir.starts_with(category.dir_in(&self.home_dir)) {
            excludes.push(self.archive_dir.to_string_lossy().into_owned());
        }
        excludes
    }

    /// Ensure the working tree and archive roots exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.home_dir).at("create working tree", &self.home_dir)?;
        std::fs::create_dir_all(&self.archive_dir).at("create archive", &self.archive_dir)?;
        Ok(())
    }
}
