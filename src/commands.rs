//! Handlers for the `appctr` subcommands.
//!
//! Each handler resolves its arguments against one [`SwapEngine`], calls a
//! single engine operation and reports through [`Ui`]. Destructive commands
//! ask for confirmation unless `--force` is given.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};

use crate::categories::Category;
use crate::container::{Container, ContainerField};
use crate::doctor::run_doctor;
use crate::fs_utils::dir_size;
use crate::paths::Paths;
use crate::swap::SwapEngine;
use crate::ui::{Tone, Ui, format_bytes};

/// Find a container by full uuid, unique uuid prefix or unique name
pub fn resolve(engine: &mut SwapEngine, query: &str) -> Result<Container> {
    let containers = engine.containers()?;

    if let Some(exact) = containers.iter().find(|c| c.uuid().eq_ignore_ascii_case(query)) {
        return Ok(exact.clone());
    }

    let by_name: Vec<&Container> = containers.iter().filter(|c| c.name() == Some(query)).collect();
    let query_lower = query.to_ascii_lowercase();
    let by_prefix: Vec<&Container> = containers
        .iter()
        .filter(|c| c.uuid().starts_with(&query_lower))
        .collect();

    match (by_name.as_slice(), by_prefix.as_slice()) {
        ([only], _) => Ok((*only).clone()),
        ([], [only]) => Ok((*only).clone()),
        ([], []) => bail!(
            "No container matches '{query}'.\nHint: Use 'appctr list' to see available containers."
        ),
        ([_, _, ..], _) => bail!(
            "Several containers are named '{query}'.\nHint: Refer to one by its uuid instead."
        ),
        (_, _) => bail!("'{query}' is an ambiguous uuid prefix.\nHint: Type more characters."),
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn short_uuid(uuid: &str) -> &str {
    uuid.get(..8).unwrap_or(uuid)
}

/// Ask before a destructive operation. `--force` skips the prompt.
fn confirm(prompt: &str, help: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    inquire::Confirm::new(prompt)
        .with_default(false)
        .with_help_message(help)
        .prompt()
        .context("Confirmation cancelled")
}

pub fn list(engine: &mut SwapEngine, ui: &Ui) -> Result<()> {
    let active = engine.active_uuid();
    let containers = engine.containers()?.to_vec();

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Container"),
        ui.header_cell("UUID"),
        ui.header_cell("Activations"),
        ui.header_cell("Last active"),
    ]);

    for container in &containers {
        let is_active = container.uuid() == active;
        let name_cell = if is_active {
            ui.colored_cell(container.display_name(), AnsiColor::Green)
        } else {
            ui.cell(container.display_name())
        };
        table.add_row(vec![
            ui.cell(if is_active { ui.icon(Tone::Ok) } else { " " }),
            name_cell,
            ui.cell(short_uuid(container.uuid())),
            ui.cell(container.activated_count().to_string()),
            ui.cell(format_date(container.last_activated_date())),
        ]);
    }

    ui.section("Containers");
    ui.println(table.to_string());
    Ok(())
}

pub fn current(engine: &mut SwapEngine, ui: &Ui) -> Result<()> {
    let uuid = engine.active_uuid();
    let Some(container) = engine.active_container()? else {
        ui.warn(format!("Active container {uuid} is not registered"));
        ui.println(format!("  Run {} to investigate.", ui.bold("appctr doctor")));
        return Ok(());
    };

    let mut table = ui.simple_table();
    table.add_row(vec![ui.cell("Active container:"), ui.header_cell(container.display_name())]);
    table.add_row(vec![ui.cell("UUID:"), ui.cell(container.uuid())]);
    table.add_row(vec![
        ui.cell("Working tree:"),
        ui.cell(engine.paths().home_dir.display().to_string()),
    ]);
    table.add_row(vec![
        ui.cell("Activated since:"),
        ui.cell(format_date(container.last_activated_date())),
    ]);

    ui.section("Current Container");
    ui.println(table.to_string());
    Ok(())
}

pub fn inspect(engine: &mut SwapEngine, query: &str, ui: &Ui) -> Result<()> {
    let container = resolve(engine, query)?;
    let roots = engine.content_roots(&container);
    let is_active = engine.is_active(&container);

    ui.section(format!("Container: {}", container.display_name()));
    ui.newline();

    let mut table = ui.simple_table();
    table.add_row(vec![ui.cell("UUID:"), ui.cell(container.uuid())]);
    if let Some(description) = container.description() {
        table.add_row(vec![ui.cell("Description:"), ui.cell(description)]);
    }
    table.add_row(vec![
        ui.cell("Created:"),
        ui.cell(format_date(Some(container.created_at()))),
    ]);
    table.add_row(vec![
        ui.cell("Last active:"),
        ui.cell(format_date(container.last_activated_date())),
    ]);
    table.add_row(vec![
        ui.cell("Activations:"),
        ui.cell(container.activated_count().to_string()),
    ]);
    table.add_row(vec![
        ui.cell("State:"),
        if is_active {
            ui.colored_cell("active", AnsiColor::Green)
        } else {
            ui.cell("archived")
        },
    ]);
    let locations: Vec<String> = roots.iter().map(|root| root.display().to_string()).collect();
    table.add_row(vec![ui.cell("Content:"), ui.cell(locations.join("\n"))]);
    ui.println(table.to_string());
    ui.newline();

    ui.section("Categories");
    let mut sizes = ui.simple_table();
    sizes.set_header(vec![ui.header_cell("Category"), ui.header_cell("Size")]);
    for category in Category::all() {
        let excludes = engine.paths().excludes_for(category);
        let dirs: Vec<_> = roots
            .iter()
            .map(|root| category.dir_in(root))
            .filter(|dir| dir.is_dir())
            .collect();
        let size_cell = if dirs.is_empty() {
            ui.colored_cell("missing", AnsiColor::Red)
        } else {
            let size: u64 = dirs.iter().map(|dir| dir_size(dir, &excludes)).sum();
            ui.cell(format_bytes(size))
        };
        sizes.add_row(vec![ui.cell(category.display_name()), size_cell]);
    }
    ui.println(sizes.to_string());
    Ok(())
}

pub fn create(
    engine: &mut SwapEngine,
    name: &str,
    description: Option<String>,
    ui: &Ui,
) -> Result<()> {
    let container = engine.create_container(Some(name.to_string()), description)?;
    ui.ok(format!("Created container '{}' ({})", name, container.uuid()));
    ui.newline();
    ui.println("To switch to it:");
    ui.println(format!("  appctr use {name}"));
    Ok(())
}

pub fn use_container(engine: &mut SwapEngine, query: &str, ui: &Ui) -> Result<()> {
    let target = resolve(engine, query)?;
    if engine.is_active(&target) {
        ui.info(format!("'{}' is already active", target.display_name()));
        return Ok(());
    }

    let spinner = ui.spinner(format!("Switching to '{}'...", target.display_name()));
    match engine.activate(&target) {
        Ok(()) => {
            ui.spinner_finish(
                &spinner,
                Tone::Ok,
                format!("Active container: {}", target.display_name()),
            );
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish(&spinner, Tone::Error, format!("Failed to switch: {e}"));
            Err(e.into())
        }
    }
}

pub fn stash(engine: &mut SwapEngine, ui: &Ui) -> Result<()> {
    engine.stash()?;
    ui.ok("Moved the working tree into the active container's slot");
    ui.println(format!("  Restore it with {}", ui.bold("appctr unstash")));
    Ok(())
}

pub fn unstash(engine: &mut SwapEngine, ui: &Ui) -> Result<()> {
    engine.unstash()?;
    ui.ok("Restored the active container into the working tree");
    Ok(())
}

pub fn clone(
    engine: &mut SwapEngine,
    query: &str,
    name: &str,
    description: Option<String>,
    ui: &Ui,
) -> Result<()> {
    let source = resolve(engine, query)?;
    let spinner = ui.spinner(format!("Copying '{}'...", source.display_name()));
    match engine.clone_container(&source, Some(name.to_string()), description) {
        Ok(copy) => {
            ui.spinner_finish(
                &spinner,
                Tone::Ok,
                format!(
                    "Cloned '{}' into '{}' ({})",
                    source.display_name(),
                    name,
                    copy.uuid()
                ),
            );
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish(&spinner, Tone::Error, format!("Failed to clone: {e}"));
            Err(e.into())
        }
    }
}

pub fn rename(engine: &mut SwapEngine, query: &str, name: &str, ui: &Ui) -> Result<()> {
    let container = resolve(engine, query)?;
    engine.update_container(container.uuid(), ContainerField::Name(Some(name.to_string())))?;
    ui.ok(format!("Renamed '{}' to '{}'", container.display_name(), name));
    Ok(())
}

pub fn describe(
    engine: &mut SwapEngine,
    query: &str,
    description: Option<String>,
    ui: &Ui,
) -> Result<()> {
    let container = resolve(engine, query)?;
    let cleared = description.is_none();
    engine.update_container(container.uuid(), ContainerField::Description(description))?;
    if cleared {
        ui.ok(format!("Cleared the description of '{}'", container.display_name()));
    } else {
        ui.ok(format!("Updated the description of '{}'", container.display_name()));
    }
    Ok(())
}

pub fn clean(engine: &mut SwapEngine, query: &str, force: bool, ui: &Ui) -> Result<()> {
    let container = resolve(engine, query)?;
    let prompt = format!("Delete all content of '{}'?", container.display_name());
    if !confirm(&prompt, "The container itself is kept", force)? {
        ui.warn("Clean cancelled.");
        return Ok(());
    }

    engine.clean_container(&container)?;
    ui.ok(format!("Cleaned '{}'", container.display_name()));
    Ok(())
}

pub fn delete(engine: &mut SwapEngine, query: &str, force: bool, ui: &Ui) -> Result<()> {
    let container = resolve(engine, query)?;
    if container.is_default() {
        bail!(
            "The default container cannot be deleted.\nHint: Use 'appctr clean' to empty it or 'appctr reset' to start over."
        );
    }

    let was_active = engine.is_active(&container);
    let prompt = format!("Delete container '{}'?", container.display_name());
    let help = if was_active {
        "It is active; the default container is switched in first"
    } else {
        "This permanently deletes the container and its content"
    };
    if !confirm(&prompt, help, force)? {
        ui.warn("Deletion cancelled.");
        return Ok(());
    }

    engine.delete_container(container.uuid())?;
    ui.ok(format!("Deleted '{}'", container.display_name()));
    if was_active {
        ui.info("Switched to the default container");
    }
    Ok(())
}

pub fn reset(engine: &mut SwapEngine, force: bool, ui: &Ui) -> Result<()> {
    let prompt = "Delete every container and restore the default one?";
    if !confirm(prompt, "This cannot be undone", force)? {
        ui.warn("Reset cancelled.");
        return Ok(());
    }

    engine.reset()?;
    ui.ok("Archive removed; the default container's content is in the working tree");
    Ok(())
}

pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, ui) {
        bail!("doctor found problems");
    }
    Ok(())
}
