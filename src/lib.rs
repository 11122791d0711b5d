pub mod categories;
pub mod commands;
pub mod container;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod lock;
pub mod observer;
pub mod paths;
pub mod preferences;
pub mod registry;
pub mod settings;
pub mod swap;
pub mod ui;

#[cfg(test)]
pub mod test_utils;

pub use container::{Container, ContainerField, DEFAULT_CONTAINER_UUID};
pub use error::{Error, Result};
pub use observer::{ContainerObserver, ObserverHub, Subscription};
pub use preferences::{JsonPreferences, NoopPreferences, PreferenceSync};
pub use swap::SwapEngine;
