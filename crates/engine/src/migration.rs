//! Schema migration.
//!
//! Linear and one-directional:
//!
//! ```text
//! legacy per-branch stores ──► v1 unified document ──► v2 (adds views)
//! ```
//!
//! Migration works on raw JSON so that historical shapes (quick access as a
//! bare grid, items as arrays, foreign field names) can be repaired before
//! the typed parse. It never fails: anything unrecognizable degrades to the
//! default scaffold. Running it on its own output is a no-op.

use serde_json::{json, Map, Value};

use quickslot_core::SlotKey;

use crate::backend::LegacyBranch;
use crate::model::{ContainerGrid, DefaultLayout, State, CURRENT_VERSION, DEFAULT_VIEW_ICON, DEFAULT_VIEW_ID, DEFAULT_VIEW_NAME};

/// Contents of the pre-unification stores, as read from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyStores {
    pub hotbar: Option<Value>,
    pub weapon_sets: Option<Value>,
    pub quick_access: Option<Value>,
    pub active_set: Option<Value>,
}

impl LegacyStores {
    pub fn is_empty(&self) -> bool {
        self.hotbar.is_none() && self.weapon_sets.is_none() && self.quick_access.is_none() && self.active_set.is_none()
    }

    pub fn set(&mut self, branch: LegacyBranch, value: Value) {
        let slot = match branch {
            LegacyBranch::Hotbar => &mut self.hotbar,
            LegacyBranch::WeaponSets => &mut self.weapon_sets,
            LegacyBranch::QuickAccess => &mut self.quick_access,
            LegacyBranch::ActiveSet => &mut self.active_set,
        };
        *slot = Some(value);
    }
}

/// Result of migrating a stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub state: State,
    /// The repaired document differs from the input and should be persisted.
    pub changed: bool,
    /// Detected version of the input, `None` if unrecognizable.
    pub from_version: Option<u32>,
}

/// Migrate a stored unified document (any version) to the current schema.
pub fn migrate_document(doc: &Value, layout: &DefaultLayout) -> Migrated {
    let Some(from_version) = detect_version(doc) else {
        log::warn!("[Migration] Stored document has no recognizable shape, using default scaffold");
        return Migrated { state: State::scaffold(layout), changed: true, from_version: None };
    };

    let mut value = doc.clone();
    if from_version < 2 {
        log::info!("[Migration] Upgrading document from v{} to v2", from_version);
        value = v1_to_v2(value);
    }
    if from_version > CURRENT_VERSION {
        log::warn!(
            "[Migration] Document version {} is newer than supported {}, reading best effort",
            from_version,
            CURRENT_VERSION
        );
    }

    let value = normalize_document(value);
    let mut state = match serde_json::from_value::<State>(value) {
        Ok(state) => state,
        Err(e) => {
            log::warn!("[Migration] Document does not match schema ({}), using default scaffold", e);
            State::scaffold(layout)
        }
    };
    state.version = CURRENT_VERSION;
    repair(&mut state, layout);

    let changed = serde_json::to_value(&state).map(|v| &v != doc).unwrap_or(true);
    log::debug!("[Migration] from v{} changed={}", from_version, changed);
    Migrated { state, changed, from_version: Some(from_version) }
}

/// Unify legacy stores and bring the result to the current schema.
pub fn migrate_legacy(legacy: &LegacyStores, layout: &DefaultLayout) -> State {
    log::info!("[Migration] Unifying legacy stores into a versioned document");
    migrate_document(&legacy_to_v1(legacy), layout).state
}

/// Legacy stores -> v1 document. A separate `activeSet` store overrides any
/// active index embedded in the weapon sets store.
pub fn legacy_to_v1(legacy: &LegacyStores) -> Value {
    let hotbar = normalize_hotbar(legacy.hotbar.as_ref().unwrap_or(&Value::Null));
    let mut weapon_sets = normalize_weapon_sets(legacy.weapon_sets.as_ref().unwrap_or(&Value::Null));
    if let Some(active) = legacy.active_set.as_ref().and_then(Value::as_u64) {
        weapon_sets["activeSet"] = json!(active);
    }
    let quick_access = normalize_quick_access(legacy.quick_access.as_ref().unwrap_or(&Value::Null));
    json!({
        "version": 1,
        "hotbar": hotbar,
        "weaponSets": weapon_sets,
        "quickAccess": quick_access,
    })
}

/// v1 -> v2: wrap the live hotbar into a single default view. Weapon sets and
/// quick access stay outside views.
pub fn v1_to_v2(mut doc: Value) -> Value {
    let hotbar = doc.get("hotbar").cloned().unwrap_or_else(|| json!({ "grids": [] }));
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".to_string(), json!(2));
        obj.insert(
            "views".to_string(),
            json!({
                "list": [{
                    "id": DEFAULT_VIEW_ID,
                    "name": DEFAULT_VIEW_NAME,
                    "icon": DEFAULT_VIEW_ICON,
                    "hotbarState": { "hotbar": hotbar },
                }],
                "activeViewId": DEFAULT_VIEW_ID,
            }),
        );
    }
    doc
}

fn detect_version(doc: &Value) -> Option<u32> {
    let obj = doc.as_object()?;
    match obj.get("version").and_then(Value::as_u64) {
        Some(v) => Some(u32::try_from(v).unwrap_or(u32::MAX).max(1)),
        None if ["hotbar", "weaponSets", "quickAccess"].iter().any(|k| obj.contains_key(*k)) => Some(1),
        None => None,
    }
}

// ============================================================================
// Shape fixes
// ============================================================================

fn normalize_document(mut doc: Value) -> Value {
    let Some(obj) = doc.as_object_mut() else {
        return doc;
    };
    let hotbar = normalize_hotbar(obj.get("hotbar").unwrap_or(&Value::Null));
    obj.insert("hotbar".to_string(), hotbar);
    let weapon_sets = normalize_weapon_sets(obj.get("weaponSets").unwrap_or(&Value::Null));
    obj.insert("weaponSets".to_string(), weapon_sets);
    let quick_access = normalize_quick_access(obj.get("quickAccess").unwrap_or(&Value::Null));
    obj.insert("quickAccess".to_string(), quick_access);

    if let Some(list) = obj.get_mut("views").and_then(|v| v.get_mut("list")).and_then(Value::as_array_mut) {
        list.retain(|v| v.get("id").and_then(Value::as_str).is_some());
        for view in list.iter_mut() {
            let stored = view.pointer("/hotbarState/hotbar").cloned().unwrap_or(Value::Null);
            view["hotbarState"] = json!({ "hotbar": normalize_hotbar(&stored) });
            if view.get("name").and_then(Value::as_str).is_none() {
                view["name"] = json!(DEFAULT_VIEW_NAME);
            }
        }
    }
    doc
}

/// `{grids}`, a bare array of grids, or a single grid -> `{grids: [...]}`.
fn normalize_hotbar(value: &Value) -> Value {
    json!({ "grids": normalize_grid_list(value, "grids") })
}

/// `{sets, activeSet}` or a bare array of sets -> `{sets, activeSet}`.
fn normalize_weapon_sets(value: &Value) -> Value {
    let active = value.get("activeSet").and_then(Value::as_u64).unwrap_or(0);
    json!({ "sets": normalize_grid_list(value, "sets"), "activeSet": active })
}

/// Quick access historically stored a single grid object, or a grid whose
/// items were an array, instead of `{grids: [...]}`. Items are converted to a
/// key -> record map first, then the grid is wrapped.
pub fn normalize_quick_access(value: &Value) -> Value {
    json!({ "grids": normalize_grid_list(value, "grids") })
}

fn normalize_grid_list(value: &Value, field: &str) -> Vec<Value> {
    match value {
        Value::Array(grids) => grids.iter().filter_map(normalize_grid).collect(),
        Value::Object(obj) => match obj.get(field) {
            Some(Value::Array(grids)) => grids.iter().filter_map(normalize_grid).collect(),
            _ if looks_like_grid(obj) => normalize_grid(value).into_iter().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn looks_like_grid(obj: &Map<String, Value>) -> bool {
    obj.contains_key("items") || (obj.contains_key("rows") && obj.contains_key("cols"))
}

fn normalize_grid(value: &Value) -> Option<Value> {
    let obj = value.as_object()?;
    let rows = obj.get("rows").and_then(Value::as_u64).unwrap_or(1).max(1);
    let cols = obj.get("cols").and_then(Value::as_u64).unwrap_or(1).max(1);
    let items = match obj.get("items") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| {
                let key: SlotKey = k.parse().ok()?;
                Some((key.to_string(), normalize_cell(v)?))
            })
            .collect::<Map<String, Value>>(),
        Some(Value::Array(list)) => list
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let key = v
                    .get("slotKey")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<SlotKey>().ok())
                    .unwrap_or_else(|| SlotKey::new(i % cols as usize, i / cols as usize));
                let mut cell = normalize_cell(v)?;
                if let Some(record) = cell.as_object_mut() {
                    record.remove("slotKey");
                }
                Some((key.to_string(), cell))
            })
            .collect(),
        _ => Map::new(),
    };
    Some(json!({ "rows": rows, "cols": cols, "items": items }))
}

/// A cell value: `null` stays `null`; a record gets foreign field names
/// mapped and its embedded grid normalized; anything without a reference id
/// is dropped.
fn normalize_cell(value: &Value) -> Option<Value> {
    let Some(obj) = value.as_object() else {
        return value.is_null().then_some(Value::Null);
    };
    let mut record = obj.clone();
    for (from, to) in [("uuid", "referenceId"), ("name", "displayName"), ("img", "imageRef"), ("type", "kind")] {
        if !record.contains_key(to) {
            if let Some(v) = record.remove(from) {
                record.insert(to.to_string(), v);
            }
        }
    }
    if !record.get("referenceId").is_some_and(Value::is_string) {
        return None;
    }
    for text in ["displayName", "imageRef", "kind"] {
        if record.get(text).is_some_and(|v| !v.is_string()) {
            record.remove(text);
        }
    }
    if let Some(grid) = record.remove("containerGrid") {
        if let Some(grid) = normalize_grid(&grid) {
            record.insert("containerGrid".to_string(), grid);
        }
    }
    Some(Value::Object(record))
}

// ============================================================================
// Typed repair
// ============================================================================

/// Enforce the structural invariants on a parsed document.
fn repair(state: &mut State, layout: &DefaultLayout) {
    if state.hotbar.grids.is_empty() {
        state.hotbar = layout.hotbar();
    }
    if state.weapon_sets.sets.is_empty() {
        state.weapon_sets.sets = layout.weapon_sets().sets;
    }
    if state.weapon_sets.active_set >= state.weapon_sets.sets.len() {
        log::warn!(
            "[Migration] activeSet {} out of range, resetting to 0",
            state.weapon_sets.active_set
        );
        state.weapon_sets.active_set = 0;
    }
    if state.quick_access.grids.is_empty() {
        state.quick_access = layout.quick_access();
    }

    let grids = state
        .hotbar
        .grids
        .iter_mut()
        .chain(state.weapon_sets.sets.iter_mut())
        .chain(state.quick_access.grids.iter_mut())
        .chain(state.views.list.iter_mut().flat_map(|v| v.hotbar_state.hotbar.grids.iter_mut()));
    for grid in grids {
        repair_grid(grid);
    }

    if state.views.list.is_empty() {
        state.views.list.push(layout.default_view(state.hotbar.clone()));
    }
    if state.views.active().is_none() {
        state.views.active_view_id = state.views.list[0].id.clone();
    }
    state.sync_active_view();
}

/// Keep every key inside `rows × cols`, recursively through nested grids.
fn repair_grid(grid: &mut ContainerGrid) {
    grid.rows = grid.rows.max(1);
    grid.cols = grid.cols.max(1);
    for dropped in grid.resize_cols(grid.cols) {
        log::warn!("[Migration] No free slot for '{}', dropping it", dropped.reference_id);
    }
    for (_, cell) in grid.items.iter_mut() {
        if let Some(nested) = cell.as_mut().and_then(|r| r.container_grid.as_mut()) {
            repair_grid(nested);
        }
    }
}
