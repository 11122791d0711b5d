//! Error types for the container library.
//!
//! Filesystem failures always carry the path and the action that was being
//! attempted, so a partially completed swap can be diagnosed from the message.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library error type
#[derive(Error, Debug)]
pub enum Error {
    /// No container with this uuid is known to the registry
    #[error("container not found: {uuid}")]
    ContainerNotFound { uuid: String },

    /// The registry knows the container but its content location is missing
    #[error("directory for container {uuid} not found: {}", path.display())]
    ContainerDirectoryNotFound { uuid: String, path: PathBuf },

    /// The zero-uuid container holds the pre-existing state and is never removed
    #[error("the default container cannot be deleted")]
    DefaultContainerProtected,

    /// A filesystem operation failed
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A descriptor or settings document could not be encoded or decoded
    #[error("invalid document {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The preference bridge reported a failure
    #[error("preference sync failed: {0}")]
    PreferenceSync(String),

    /// No working tree location could be determined
    #[error("could not determine a working tree directory")]
    HomeUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach the failing path and action to an `io::Result`
pub(crate) trait IoResultExt<T> {
    fn at(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}
