// Command implementations. Each opens a store bound to the requested owner,
// runs one operation, and prints a human or JSON report.

use std::sync::Arc;

use serde_json::{json, Value};

use quickslot_core::{CellLocation, CellPath, ContainerKind, OwnerHandle, SlotKey};
use quickslot_engine::backend::{DocumentBackend, LegacyBranch, StorageKey};
use quickslot_engine::model::{CellRecord, ContainerGrid, ReferenceExclusion, State};
use quickslot_engine::{PersistenceManager, StoreOptions};

use crate::exit_codes::{EXIT_OUT_OF_RANGE, EXIT_REFERENCE_NOT_FOUND, EXIT_VIEW_REFUSED};
use crate::CliError;

pub struct Context {
    pub options: StoreOptions,
    pub backend: Arc<dyn DocumentBackend>,
    pub owner: OwnerHandle,
    pub json: bool,
}

impl Context {
    fn store(&self) -> PersistenceManager {
        self.store_for(&self.owner)
    }

    fn store_for(&self, owner: &OwnerHandle) -> PersistenceManager {
        let store = PersistenceManager::new(self.backend.clone(), self.options);
        store.bind_owner(owner.clone());
        store
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::general(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// ============================================================================
// show
// ============================================================================

pub fn cmd_show(ctx: &Context) -> Result<(), CliError> {
    let state = ctx.store().load()?;
    if ctx.json {
        let doc = serde_json::to_value(&state).map_err(|e| CliError::general(e.to_string()))?;
        return print_json(&doc);
    }
    print!("{}", render_state(&ctx.owner, &state));
    Ok(())
}

fn render_state(owner: &OwnerHandle, state: &State) -> String {
    let mut out = String::new();
    let view = state.active_view().map(|v| v.name.as_str()).unwrap_or("?");
    out.push_str(&format!("{}  v{}  revision {}  view '{}'\n", owner, state.version, state.revision, view));

    let sections: [(ContainerKind, &Vec<ContainerGrid>); 3] = [
        (ContainerKind::Hotbar, &state.hotbar.grids),
        (ContainerKind::WeaponSet, &state.weapon_sets.sets),
        (ContainerKind::QuickAccess, &state.quick_access.grids),
    ];
    for (kind, grids) in sections {
        for (index, grid) in grids.iter().enumerate() {
            let active = kind == ContainerKind::WeaponSet && index == state.weapon_sets.active_set;
            out.push_str(&format!(
                "{}[{}] {}x{}{}\n",
                kind,
                index,
                grid.cols,
                grid.rows,
                if active { " (active)" } else { "" }
            ));
            render_grid(&mut out, grid, 1);
        }
    }
    out
}

fn render_grid(out: &mut String, grid: &ContainerGrid, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, record) in grid.occupied() {
        out.push_str(&format!("{}{:<6}{}  ({})\n", indent, key.to_string(), record.display_name, record.reference_id));
        if let Some(inner) = &record.container_grid {
            render_grid(out, inner, depth + 1);
        }
    }
}

// ============================================================================
// migrate
// ============================================================================

/// What was stored for an owner before loading.
fn stored_shape(backend: &dyn DocumentBackend, owner: &OwnerHandle) -> Result<String, CliError> {
    if let Some(doc) = backend.read(&StorageKey::state(owner))? {
        return Ok(match doc.get("version").and_then(Value::as_u64) {
            Some(version) => format!("v{}", version),
            None => "unversioned".to_string(),
        });
    }
    for branch in LegacyBranch::ALL {
        if backend.read(&StorageKey::legacy(owner, branch))?.is_some() {
            return Ok("legacy".to_string());
        }
    }
    Ok("none".to_string())
}

pub fn cmd_migrate(ctx: &Context, all: bool) -> Result<(), CliError> {
    let owners = if all {
        let mut owners: Vec<OwnerHandle> = Vec::new();
        for key in ctx.backend.keys()? {
            if !owners.contains(&key.owner) {
                owners.push(key.owner);
            }
        }
        owners
    } else {
        vec![ctx.owner.clone()]
    };

    let mut reports = Vec::new();
    for owner in &owners {
        let before = stored_shape(ctx.backend.as_ref(), owner)?;
        if before == "none" {
            reports.push(json!({ "owner": owner.to_string(), "from": before, "migrated": false }));
            continue;
        }
        let state = ctx.store_for(owner).load()?;
        let still_legacy = LegacyBranch::ALL
            .into_iter()
            .filter(|b| ctx.backend.read(&StorageKey::legacy(owner, *b)).ok().flatten().is_some())
            .count();
        let migrated = before != format!("v{}", state.version);
        reports.push(json!({
            "owner": owner.to_string(),
            "from": before,
            "version": state.version,
            "revision": state.revision,
            "migrated": migrated,
            "legacy_remaining": still_legacy,
        }));
    }

    if ctx.json {
        return print_json(&Value::Array(reports));
    }
    if reports.is_empty() {
        println!("no stored documents");
    }
    for report in &reports {
        let owner = report["owner"].as_str().unwrap_or("?");
        let from = report["from"].as_str().unwrap_or("?");
        match (from, report["migrated"].as_bool()) {
            ("none", _) => println!("{}: nothing stored", owner),
            (_, Some(true)) => println!("{}: {} -> v{} (revision {})", owner, from, report["version"], report["revision"]),
            _ => println!("{}: up to date ({})", owner, from),
        }
    }
    Ok(())
}

// ============================================================================
// find / put / remove / clear
// ============================================================================

pub fn cmd_find(ctx: &Context, reference_id: &str) -> Result<(), CliError> {
    let store = ctx.store();
    store.load()?;
    let Some(location) = store.find_reference_in_store(reference_id, &[]) else {
        return Err(CliError::new(
            EXIT_REFERENCE_NOT_FOUND,
            format!("'{}' is not placed for {}", reference_id, ctx.owner),
        ));
    };
    if ctx.json {
        let doc = serde_json::to_value(location).map_err(|e| CliError::general(e.to_string()))?;
        return print_json(&doc);
    }
    println!("{}", location);
    Ok(())
}

pub fn cmd_put(
    ctx: &Context,
    kind: ContainerKind,
    index: usize,
    slot: SlotKey,
    reference_id: &str,
    name: Option<String>,
    img: &str,
) -> Result<(), CliError> {
    let store = ctx.store();
    store.load()?;
    let location = CellLocation::new(kind, index, slot);

    // Exclusive sets may repeat references held elsewhere; every other
    // destination must be the reference's only cell, weapon sets included.
    if kind != ContainerKind::WeaponSet {
        if let Some(existing) = store.find_reference_in_store(reference_id, &[ReferenceExclusion::at(&location)]) {
            return Err(CliError::args(format!("'{}' is already placed at {}", reference_id, existing))
                .with_hint("remove it there first"));
        }
    }

    let record = CellRecord::new(reference_id, name.unwrap_or_else(|| reference_id.to_string()), img);
    if !store.update_cell(&CellPath::top(location), Some(record))? {
        return Err(out_of_range(&location));
    }
    if !ctx.json {
        println!("{} <- {}", location, reference_id);
    }
    Ok(())
}

pub fn cmd_remove(ctx: &Context, kind: ContainerKind, index: usize, slot: SlotKey) -> Result<(), CliError> {
    let store = ctx.store();
    let location = CellLocation::new(kind, index, slot);
    let path = CellPath::top(location);
    if store.cell_record(&path)?.is_none() {
        let in_range = store
            .container(location.container_ref())?
            .is_some_and(|grid| grid.contains_key(slot));
        if !in_range {
            return Err(out_of_range(&location));
        }
        log::debug!("[Store] {} already empty", location);
        return Ok(());
    }
    store.update_cell(&path, None)?;
    if !ctx.json {
        println!("{} emptied", location);
    }
    Ok(())
}

fn out_of_range(location: &CellLocation) -> CliError {
    CliError::new(EXIT_OUT_OF_RANGE, format!("no cell {}", location))
        .with_hint("run `qslot show` for the container sizes")
}

pub fn cmd_clear(ctx: &Context) -> Result<(), CliError> {
    ctx.store().clear_all()?;
    if !ctx.json {
        println!("cleared {}", ctx.owner);
    }
    Ok(())
}

pub fn cmd_set_active_set(ctx: &Context, index: usize) -> Result<(), CliError> {
    let store = ctx.store();
    let sets = store.load()?.weapon_sets.sets.len();
    if index >= sets {
        return Err(CliError::new(EXIT_OUT_OF_RANGE, format!("no weapon set {} (have {})", index, sets)));
    }
    let changed = store.set_active_weapon_set(index)?;
    if !ctx.json {
        if changed {
            println!("weapon set {} active", index);
        } else {
            println!("weapon set {} already active", index);
        }
    }
    Ok(())
}

// ============================================================================
// views
// ============================================================================

fn view_refused(what: &str, id: &str) -> CliError {
    CliError::new(EXIT_VIEW_REFUSED, format!("cannot {} view '{}'", what, id))
        .with_hint("run `qslot views list` for valid ids; the last view cannot be deleted")
}

pub fn cmd_views_list(ctx: &Context) -> Result<(), CliError> {
    let views = ctx.store().views()?;
    if ctx.json {
        let doc = serde_json::to_value(&views).map_err(|e| CliError::general(e.to_string()))?;
        return print_json(&doc);
    }
    for view in &views.list {
        let marker = if view.id == views.active_view_id { "*" } else { " " };
        let placed: usize = view.hotbar_state.hotbar.grids.iter().map(|g| g.items.len()).sum();
        println!("{} {}  {}  [{}]  {} placed", marker, view.id, view.name, view.icon, placed);
    }
    Ok(())
}

pub fn cmd_views_create(ctx: &Context, name: &str, icon: Option<&str>) -> Result<(), CliError> {
    let id = ctx.store().create_view(name, icon)?;
    if ctx.json {
        return print_json(&json!({ "id": id }));
    }
    println!("{}", id);
    Ok(())
}

pub fn cmd_views_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    if !ctx.store().delete_view(id)? {
        return Err(view_refused("delete", id));
    }
    Ok(())
}

pub fn cmd_views_switch(ctx: &Context, id: &str) -> Result<(), CliError> {
    let store = ctx.store();
    if store.views()?.get(id).is_none() {
        return Err(view_refused("switch to", id));
    }
    store.switch_view(id)?;
    Ok(())
}

pub fn cmd_views_rename(ctx: &Context, id: &str, name: &str, icon: Option<&str>) -> Result<(), CliError> {
    if !ctx.store().rename_view(id, name, icon)? {
        return Err(view_refused("rename", id));
    }
    Ok(())
}

pub fn cmd_views_duplicate(ctx: &Context, id: &str) -> Result<(), CliError> {
    let Some(copy) = ctx.store().duplicate_view(id)? else {
        return Err(view_refused("duplicate", id));
    };
    if ctx.json {
        return print_json(&json!({ "id": copy }));
    }
    println!("{}", copy);
    Ok(())
}
