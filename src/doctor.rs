//! `appctr doctor`: read-only health checks for a working tree and its archive.
//!
//! Each check prints one line per finding. Errors make the run fail;
//! warnings point at something odd that the engine copes with (an
//! interrupted swap, an orphaned slot, a missing category directory).

use anstyle::AnsiColor;
use std::collections::BTreeSet;
use std::fs;

use crate::categories::Category;
use crate::container::{Container, DEFAULT_CONTAINER_UUID};
use crate::fs_utils::has_files;
use crate::lock::ArchiveLock;
use crate::paths::Paths;
use crate::settings::{ContainerSettings, SettingsStore};
use crate::ui::{Tone, Ui};

/// Run every check. Returns true when no errors were found.
pub fn run_doctor(paths: &Paths, ui: &Ui) -> bool {
    ui.section("appctr doctor");
    ui.newline();

    let mut healthy = true;
    healthy &= check_step(ui, "directories", || check_directories(paths, ui));

    let known = check_step_with(ui, "containers", || check_containers(paths, ui));
    healthy &= known.is_some();
    let known = known.unwrap_or_default();

    healthy &= check_step(ui, "settings", || check_settings(paths, ui, &known));
    healthy &= check_step(ui, "lock", || check_lock(paths, ui));

    if healthy {
        ui.ok("no problems found");
    } else {
        ui.err("problems found, see above");
    }
    healthy
}

fn line(ui: &Ui, tone: Tone, msg: impl AsRef<str>) {
    ui.println(format!("  {} {}", ui.icon(tone), msg.as_ref()));
}

fn check_directories(paths: &Paths, ui: &Ui) -> bool {
    if paths.home_dir.is_dir() {
        line(ui, Tone::Ok, format!("working tree: {}", paths.home_dir.display()));
    } else {
        line(ui, Tone::Error, format!("working tree missing: {}", paths.home_dir.display()));
        return false;
    }

    if paths.archive_dir.is_dir() {
        line(ui, Tone::Ok, format!("archive: {}", paths.archive_dir.display()));
    } else {
        line(
            ui,
            Tone::Info,
            format!("archive not created yet: {}", paths.archive_dir.display()),
        );
    }
    true
}

/// Returns the uuids of readable containers, or `None` if a slot is broken
fn check_containers(paths: &Paths, ui: &Ui) -> Option<BTreeSet<String>> {
    let mut known = BTreeSet::new();
    if !paths.archive_dir.is_dir() {
        line(ui, Tone::Info, "no containers yet");
        return Some(known);
    }

    let entries = match fs::read_dir(&paths.archive_dir) {
        Ok(entries) => entries,
        Err(e) => {
            line(ui, Tone::Error, format!("cannot read archive: {e}"));
            return None;
        }
    };

    let mut ok = true;
    let mut slots: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    slots.sort();

    for slot in slots {
        let slot_name = slot
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let container = match Container::read(&slot) {
            Ok(container) => container,
            Err(e) => {
                line(ui, Tone::Warn, format!("orphaned slot {slot_name}: {e}"));
                continue;
            }
        };

        if container.uuid() != slot_name {
            line(
                ui,
                Tone::Error,
                format!("slot {slot_name} holds the descriptor of {}", container.uuid()),
            );
            ok = false;
            continue;
        }

        let missing: Vec<&str> = Category::all()
            .iter()
            .filter(|category| !category.dir_in(&slot).is_dir())
            .map(|category| category.relative_path())
            .collect();
        if missing.is_empty() {
            line(ui, Tone::Ok, format!("{} ({})", container.display_name(), container.uuid()));
        } else {
            line(
                ui,
                Tone::Warn,
                format!(
                    "{} ({}) is missing {}",
                    container.display_name(),
                    container.uuid(),
                    missing.join(", ")
                ),
            );
        }
        known.insert(container.uuid().to_string());
    }

    if !known.contains(DEFAULT_CONTAINER_UUID) {
        line(ui, Tone::Warn, "default container missing; it is re-created on next use");
    }

    ok.then_some(known)
}

fn check_settings(paths: &Paths, ui: &Ui, known: &BTreeSet<String>) -> bool {
    let store = SettingsStore::new(paths.settings_file.clone());
    let settings = if store.path().exists() {
        let Some(settings) = store.load() else {
            line(ui, Tone::Error, format!("unreadable settings file: {}", store.path().display()));
            return false;
        };
        settings
    } else {
        line(ui, Tone::Info, "no settings file; the default container is active");
        ContainerSettings::default()
    };
    let uuid = settings.current_container_uuid;

    if !known.contains(&uuid) {
        // Before first use there is nothing to point at.
        if known.is_empty() && uuid == DEFAULT_CONTAINER_UUID {
            return true;
        }
        line(ui, Tone::Error, format!("active container {uuid} is not in the archive"));
        return false;
    }
    line(ui, Tone::Ok, format!("active container: {uuid}"));

    if let Some(pending) = settings.pending_container_uuid {
        line(
            ui,
            Tone::Warn,
            format!("a swap to {pending} did not finish; `appctr use {pending}` completes it"),
        );
        return true;
    }

    let slot = paths.container_dir(&uuid);
    let parked = Category::all()
        .iter()
        .any(|category| has_files(&category.dir_in(&slot)));
    if parked {
        line(
            ui,
            Tone::Info,
            "the active container has content parked in its slot (first use or `appctr stash`); `appctr unstash` moves it into the working tree",
        );
    }
    true
}

fn check_lock(paths: &Paths, ui: &Ui) -> bool {
    if !paths.lock_file.exists() {
        line(ui, Tone::Ok, "not locked");
        return true;
    }

    match ArchiveLock::try_acquire(&paths.lock_file) {
        Ok(Some(_lock)) => line(ui, Tone::Ok, "not locked"),
        Ok(None) => line(ui, Tone::Warn, "another appctr process holds the lock"),
        Err(e) => {
            line(ui, Tone::Error, format!("cannot open lock file: {e}"));
            return false;
        }
    }
    true
}

fn check_step(ui: &Ui, name: &str, check: impl FnOnce() -> bool) -> bool {
    check_step_with(ui, name, || check().then_some(())).is_some()
}

fn check_step_with<T>(ui: &Ui, name: &str, check: impl FnOnce() -> Option<T>) -> Option<T> {
    ui.println(ui.bold(format!("Checking {name}...")));
    let result = check();
    if result.is_none() {
        ui.println(ui.colored("  issues detected", AnsiColor::Red));
    }
    ui.newline();
    result
}
