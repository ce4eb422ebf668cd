//! The state store.
//!
//! `PersistenceManager` owns the canonical state document for the bound
//! owner. All mutation goes through its `update_*`/view methods, each of which
//! is an atomic read-modify-write against the in-memory cache followed by a
//! durable write.
//!
//! Locking: `inner` (owner + cache) is always taken before `gate` (durable
//! writes). The gate is held across the backend write, so concurrent saves
//! queue up and reach storage in issuance order. Listeners are called with
//! no store lock held, so they may call back into the store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use quickslot_core::{CellLocation, CellPath, ContainerKind, ContainerRef, OwnerHandle};

use crate::backend::{DocumentBackend, LegacyBranch, StorageKey};
use crate::error::StoreError;
use crate::events::{ChangeKind, SavedEvent, StateChangedEvent, StateListener, StoreEvent};
use crate::migration::{migrate_document, migrate_legacy, LegacyStores};
use crate::model::{
    CellRecord, ContainerGrid, ContainerItems, DefaultLayout, ReferenceExclusion, State, View, ViewHotbarState, Views,
    DEFAULT_VIEW_ICON,
};

/// Default self-echo suppression window.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_millis(500);

/// How many of our own recent revisions to remember for echo detection.
const RECENT_REVISIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// A reload request within this long after a local save is treated as
    /// the echo of that save.
    pub echo_window: Duration,
    pub layout: DefaultLayout,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { echo_window: DEFAULT_ECHO_WINDOW, layout: DefaultLayout::default() }
    }
}

struct Inner {
    owner: OwnerHandle,
    cache: Option<State>,
}

/// Durable-write bookkeeping, guarded by the write gate.
#[derive(Default)]
struct WriteGate {
    /// Latest revision known to be on disk, per document.
    durable: HashMap<StorageKey, u64>,
}

#[derive(Default)]
struct SaveMarks {
    last_at: Option<Instant>,
    last_wall: Option<DateTime<Utc>>,
    recent: VecDeque<(OwnerHandle, u64)>,
}

/// What a mutation touched, for the state-changed event.
#[derive(Debug, Default)]
struct Change {
    affected: Vec<CellPath>,
    containers: Vec<ContainerRef>,
}

impl Change {
    fn cells(affected: Vec<CellPath>) -> Self {
        Self { affected, containers: Vec::new() }
    }

    fn containers(containers: Vec<ContainerRef>) -> Self {
        Self { affected: Vec::new(), containers }
    }
}

fn hotbar_refs(state: &State) -> Vec<ContainerRef> {
    (0..state.hotbar.grids.len()).map(|i| ContainerRef::new(ContainerKind::Hotbar, i)).collect()
}

fn all_refs(state: &State) -> Vec<ContainerRef> {
    let mut refs = hotbar_refs(state);
    refs.extend((0..state.weapon_sets.sets.len()).map(|i| ContainerRef::new(ContainerKind::WeaponSet, i)));
    refs.extend((0..state.quick_access.grids.len()).map(|i| ContainerRef::new(ContainerKind::QuickAccess, i)));
    refs
}

pub struct PersistenceManager {
    backend: Arc<dyn DocumentBackend>,
    options: StoreOptions,
    inner: Mutex<Inner>,
    gate: Mutex<WriteGate>,
    marks: Mutex<SaveMarks>,
    listeners: Mutex<Vec<StateListener>>,
}

impl PersistenceManager {
    pub fn new(backend: Arc<dyn DocumentBackend>, options: StoreOptions) -> Self {
        Self {
            backend,
            options,
            inner: Mutex::new(Inner { owner: OwnerHandle::Global, cache: None }),
            gate: Mutex::new(WriteGate::default()),
            marks: Mutex::new(SaveMarks::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    // =========================================================================
    // Owner context and events
    // =========================================================================

    /// Switch the owner context. The next read reloads from storage.
    pub fn bind_owner(&self, owner: OwnerHandle) {
        let mut inner = self.inner.lock();
        log::debug!("[Store] Binding owner {} (was {})", owner, inner.owner);
        inner.owner = owner;
        inner.cache = None;
    }

    pub fn owner(&self) -> OwnerHandle {
        self.inner.lock().owner.clone()
    }

    pub fn subscribe(&self, listener: StateListener) {
        self.listeners.lock().push(listener);
    }

    fn emit(&self, event: StoreEvent) {
        let listeners: Vec<StateListener> = self.listeners.lock().clone();
        for listener in &listeners {
            listener(&event);
        }
    }

    // =========================================================================
    // Load / save
    // =========================================================================

    /// The state for the bound owner, loading (and migrating) on first use.
    pub fn load(&self) -> Result<State, StoreError> {
        let mut inner = self.inner.lock();
        Ok(self.cached(&mut inner)?.clone())
    }

    /// Persist a full document. Concurrent callers are serialized; the cache
    /// takes the new document immediately.
    pub fn save(&self, state: &State) -> Result<(), StoreError> {
        let (owner, snapshot) = {
            let mut inner = self.inner.lock();
            let mut snapshot = state.clone();
            let base = inner.cache.as_ref().map_or(state.revision, |c| c.revision.max(state.revision));
            snapshot.revision = base + 1;
            inner.cache = Some(snapshot.clone());
            (inner.owner.clone(), snapshot)
        };
        self.persist_and_announce(&owner, &snapshot)
    }

    /// True if a local save completed within the echo window.
    pub fn should_skip_reload(&self) -> bool {
        self.marks
            .lock()
            .last_at
            .is_some_and(|at| at.elapsed() < self.options.echo_window)
    }

    /// True if `revision` of the bound owner's document was written by this
    /// store.
    pub fn is_own_revision(&self, revision: u64) -> bool {
        let owner = self.owner();
        self.marks.lock().recent.iter().any(|(o, r)| *o == owner && *r == revision)
    }

    /// Wall-clock time of the last successful save.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.marks.lock().last_wall
    }

    /// React to an externally observed document change. Returns true if the
    /// cache was dropped (the next read reloads), false if the change was
    /// recognized as this store's own write.
    pub fn handle_external_update(&self, revision: Option<u64>) -> bool {
        match revision {
            Some(rev) if self.is_own_revision(rev) => {
                log::debug!("[Store] Ignoring echo of own revision {}", rev);
                return false;
            }
            None if self.should_skip_reload() => {
                log::debug!("[Store] Ignoring update inside echo window");
                return false;
            }
            _ => {}
        }
        let owner = {
            let mut inner = self.inner.lock();
            inner.cache = None;
            inner.owner.clone()
        };
        log::debug!("[Store] External update for {}, cache dropped", owner);
        self.emit(StoreEvent::StateChanged(StateChangedEvent {
            kind: ChangeKind::Reloaded,
            owner,
            affected: Vec::new(),
            containers: Vec::new(),
            revision: revision.unwrap_or(0),
        }));
        true
    }

    fn cached<'a>(&self, inner: &'a mut Inner) -> Result<&'a mut State, StoreError> {
        if let Some(state) = inner.cache.take() {
            return Ok(inner.cache.insert(state));
        }
        let loaded = self.read_state(&inner.owner)?;
        Ok(inner.cache.insert(loaded))
    }

    /// Durable read with migration. Called with `inner` held.
    fn read_state(&self, owner: &OwnerHandle) -> Result<State, StoreError> {
        let key = StorageKey::state(owner);
        if let Some(doc) = self.backend.read(&key)? {
            let migrated = migrate_document(&doc, &self.options.layout);
            let mut state = migrated.state;
            if migrated.changed {
                log::info!(
                    "[Store] Migrated document for {} from {:?} to v{}",
                    owner,
                    migrated.from_version,
                    state.version
                );
                state.revision += 1;
                self.persist(owner, &state)?;
            } else {
                self.gate.lock().durable.insert(key, state.revision);
            }
            return Ok(state);
        }

        let mut legacy = LegacyStores::default();
        for branch in LegacyBranch::ALL {
            if let Some(value) = self.backend.read(&StorageKey::legacy(owner, branch))? {
                legacy.set(branch, value);
            }
        }
        if legacy.is_empty() {
            log::debug!("[Store] No document for {}, using default scaffold", owner);
            return Ok(State::scaffold(&self.options.layout));
        }

        let mut state = migrate_legacy(&legacy, &self.options.layout);
        state.revision += 1;
        self.persist(owner, &state)?;
        for branch in LegacyBranch::ALL {
            if let Err(e) = self.backend.remove(&StorageKey::legacy(owner, branch)) {
                log::warn!("[Store] Could not delete legacy {} store for {}: {}", branch.flag_name(), owner, e);
            }
        }
        log::info!("[Store] Migrated legacy stores for {}", owner);
        Ok(state)
    }

    /// Write through the gate. Returns false if a newer revision is already
    /// durable (it contains this one's changes).
    fn persist(&self, owner: &OwnerHandle, state: &State) -> Result<bool, StoreError> {
        let key = StorageKey::state(owner);
        let mut gate = self.gate.lock();
        if let Some(&durable) = gate.durable.get(&key) {
            if state.revision <= durable {
                log::debug!("[Store] Skipping stale write of revision {} (durable {})", state.revision, durable);
                return Ok(false);
            }
        }
        let doc = serde_json::to_value(state)?;
        if let Err(e) = self.backend.write(&key, &doc) {
            log::error!("[Store] Write of revision {} for {} failed: {}", state.revision, owner, e);
            return Err(e);
        }
        gate.durable.insert(key, state.revision);
        drop(gate);

        let mut marks = self.marks.lock();
        marks.last_at = Some(Instant::now());
        marks.last_wall = Some(Utc::now());
        marks.recent.push_back((owner.clone(), state.revision));
        while marks.recent.len() > RECENT_REVISIONS {
            marks.recent.pop_front();
        }
        log::debug!("[Store] Saved revision {} for {}", state.revision, owner);
        Ok(true)
    }

    fn persist_and_announce(&self, owner: &OwnerHandle, state: &State) -> Result<(), StoreError> {
        if self.persist(owner, state)? {
            self.emit(StoreEvent::Saved(SavedEvent { owner: owner.clone(), revision: state.revision }));
        }
        Ok(())
    }

    /// Atomic read-modify-write. `f` returns `None` for a no-op (nothing is
    /// written). The active view is resynced from the live hotbar before the
    /// snapshot is taken.
    fn mutate<T>(
        &self,
        kind: ChangeKind,
        f: impl FnOnce(&mut State) -> Option<(T, Change)>,
    ) -> Result<Option<T>, StoreError> {
        let (owner, snapshot, value, change) = {
            let mut inner = self.inner.lock();
            let state = self.cached(&mut inner)?;
            let Some((value, change)) = f(state) else {
                return Ok(None);
            };
            state.sync_active_view();
            state.revision += 1;
            let snapshot = state.clone();
            (inner.owner.clone(), snapshot, value, change)
        };

        self.emit(StoreEvent::StateChanged(StateChangedEvent {
            kind,
            owner: owner.clone(),
            affected: change.affected,
            containers: change.containers,
            revision: snapshot.revision,
        }));
        self.persist_and_announce(&owner, &snapshot)?;
        Ok(Some(value))
    }

    // =========================================================================
    // Reads against the cache
    // =========================================================================

    /// Record at `path`, loading state if needed.
    pub fn cell_record(&self, path: &CellPath) -> Result<Option<CellRecord>, StoreError> {
        let mut inner = self.inner.lock();
        Ok(self.cached(&mut inner)?.record_at(path).cloned())
    }

    pub fn container(&self, container: ContainerRef) -> Result<Option<ContainerGrid>, StoreError> {
        let mut inner = self.inner.lock();
        Ok(self.cached(&mut inner)?.container(container.kind, container.index).cloned())
    }

    pub fn active_weapon_set(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        Ok(self.cached(&mut inner)?.weapon_sets.active_set)
    }

    pub fn views(&self) -> Result<Views, StoreError> {
        let mut inner = self.inner.lock();
        Ok(self.cached(&mut inner)?.views.clone())
    }

    /// Where else `reference_id` sits. Reads the cache only: callers must
    /// `load` first, otherwise nothing is found.
    pub fn find_reference_in_store(&self, reference_id: &str, exclude: &[ReferenceExclusion]) -> Option<CellLocation> {
        let inner = self.inner.lock();
        match inner.cache.as_ref() {
            Some(state) => state.find_reference(reference_id, exclude),
            None => {
                log::debug!("[Store] Reference lookup for '{}' before load", reference_id);
                None
            }
        }
    }

    // =========================================================================
    // Cell and container mutation
    // =========================================================================

    /// Write one cell. Nested paths descend through each parent cell's
    /// embedded grid, creating it if absent; a missing parent record or an
    /// out-of-range key is logged and ignored. Returns whether anything was
    /// written.
    pub fn update_cell(&self, path: &CellPath, data: Option<CellRecord>) -> Result<bool, StoreError> {
        let layout = self.options.layout;
        let written = self.mutate(ChangeKind::CellUpdated, |state| {
            if !write_cell(state, path, data, &layout) {
                return None;
            }
            let mut affected = vec![path.clone()];
            let mut parent = path.parent();
            while let Some(p) = parent {
                parent = p.parent();
                affected.push(p);
            }
            Some(((), Change::cells(affected)))
        })?;
        Ok(written.is_some())
    }

    /// Write several cells as one mutation: one revision, one event, one
    /// durable write. If any path cannot be written nothing is applied.
    /// A move or swap goes through here so a failed save cannot leave the
    /// record in both cells.
    pub fn update_cells(&self, writes: Vec<(CellPath, Option<CellRecord>)>) -> Result<bool, StoreError> {
        if writes.is_empty() {
            return Ok(false);
        }
        let layout = self.options.layout;
        let written = self.mutate(ChangeKind::CellUpdated, |state| {
            let mut next = state.clone();
            let mut affected: Vec<CellPath> = Vec::new();
            for (path, data) in writes {
                if !write_cell(&mut next, &path, data, &layout) {
                    log::warn!("[Store] update_cells: {} rejected, batch dropped", path);
                    return None;
                }
                let mut current = Some(path);
                while let Some(p) = current {
                    current = p.parent();
                    if !affected.contains(&p) {
                        affected.push(p);
                    }
                }
            }
            *state = next;
            Some(((), Change::cells(affected)))
        })?;
        Ok(written.is_some())
    }

    /// Replace a container's items wholesale. Keys outside the container's
    /// bounds are discarded.
    pub fn update_container(&self, container: ContainerRef, items: ContainerItems) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::ContainerReplaced, |state| {
            let Some(grid) = state.container_mut(container.kind, container.index) else {
                log::warn!("[Store] update_container: no container {}", container);
                return None;
            };
            let (rows, cols) = (grid.rows, grid.cols);
            let before = items.len();
            let items: ContainerItems = items.into_iter().filter(|(k, _)| k.fits(rows, cols)).collect();
            if items.len() != before {
                log::warn!(
                    "[Store] update_container: dropped {} out-of-range keys for {}",
                    before - items.len(),
                    container
                );
            }
            grid.items = items;
            Some(((), Change::containers(vec![container])))
        })?;
        Ok(written.is_some())
    }

    /// Empty every hotbar grid, weapon set, and quick-access grid.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        self.mutate(ChangeKind::Cleared, |state| {
            for grid in state
                .hotbar
                .grids
                .iter_mut()
                .chain(state.weapon_sets.sets.iter_mut())
                .chain(state.quick_access.grids.iter_mut())
            {
                grid.clear();
            }
            Some(((), Change::containers(all_refs(state))))
        })?;
        Ok(())
    }

    pub fn set_active_weapon_set(&self, index: usize) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::ActiveSetChanged, |state| {
            if index >= state.weapon_sets.sets.len() {
                log::warn!("[Store] No weapon set {} (have {})", index, state.weapon_sets.sets.len());
                return None;
            }
            if state.weapon_sets.active_set == index {
                return None;
            }
            let previous = state.weapon_sets.active_set;
            state.weapon_sets.active_set = index;
            let containers = vec![
                ContainerRef::new(ContainerKind::WeaponSet, previous),
                ContainerRef::new(ContainerKind::WeaponSet, index),
            ];
            Some(((), Change::containers(containers)))
        })?;
        Ok(written.is_some())
    }

    /// Set the column counts of hotbar grids `left_index` and
    /// `left_index + 1`. Their sum must equal the current sum and each side
    /// keeps at least one column; anything else is ignored.
    pub fn resize_hotbar_grids(&self, left_index: usize, left_cols: usize, right_cols: usize) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::Resized, |state| {
            let right_index = left_index + 1;
            if right_index >= state.hotbar.grids.len() {
                log::warn!("[Store] resize: no hotbar grid pair at {}", left_index);
                return None;
            }
            let total = state.hotbar.grids[left_index].cols + state.hotbar.grids[right_index].cols;
            if left_cols == 0 || right_cols == 0 || left_cols + right_cols != total {
                log::warn!(
                    "[Store] resize: {}+{} does not conserve {} columns",
                    left_cols,
                    right_cols,
                    total
                );
                return None;
            }
            for (index, cols) in [(left_index, left_cols), (right_index, right_cols)] {
                for dropped in state.hotbar.grids[index].resize_cols(cols) {
                    log::warn!(
                        "[Store] resize: no room for '{}' in hotbar grid {}, removed",
                        dropped.reference_id,
                        index
                    );
                }
            }
            let containers = vec![
                ContainerRef::new(ContainerKind::Hotbar, left_index),
                ContainerRef::new(ContainerKind::Hotbar, right_index),
            ];
            Some(((), Change::containers(containers)))
        })?;
        Ok(written.is_some())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Add a view with an empty hotbar and make it active.
    pub fn create_view(&self, name: &str, icon: Option<&str>) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let layout = self.options.layout;
        self.mutate(ChangeKind::ViewChanged, |state| {
            state.sync_active_view();
            let hotbar = layout.hotbar();
            state.views.list.push(View {
                id: id.clone(),
                name: name.to_string(),
                icon: icon.unwrap_or(DEFAULT_VIEW_ICON).to_string(),
                hotbar_state: ViewHotbarState { hotbar: hotbar.clone() },
            });
            state.views.active_view_id = id.clone();
            state.hotbar = hotbar;
            log::info!("[Store] Created view '{}' ({})", name, id);
            Some(((), Change::containers(hotbar_refs(state))))
        })?;
        Ok(id)
    }

    /// Remove a view. The last view cannot be removed; removing the active
    /// view first switches to another one.
    pub fn delete_view(&self, view_id: &str) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::ViewChanged, |state| {
            if state.views.list.len() <= 1 {
                log::warn!("[Store] Refusing to delete the last view");
                return None;
            }
            let position = state.views.list.iter().position(|v| v.id == view_id);
            let Some(position) = position else {
                log::warn!("[Store] delete_view: no view {}", view_id);
                return None;
            };
            let mut containers = Vec::new();
            if state.views.active_view_id == view_id {
                let Some(next) = state.views.list.iter().find(|v| v.id != view_id) else {
                    return None;
                };
                state.hotbar = next.hotbar_state.hotbar.clone();
                state.views.active_view_id = next.id.clone();
                containers = hotbar_refs(state);
            }
            state.views.list.remove(position);
            log::info!("[Store] Deleted view {}", view_id);
            Some(((), Change::containers(containers)))
        })?;
        Ok(written.is_some())
    }

    /// Make `view_id` active: its stored hotbar becomes the live hotbar.
    pub fn switch_view(&self, view_id: &str) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::ViewChanged, |state| {
            if state.views.active_view_id == view_id {
                return None;
            }
            let Some(target) = state.views.get(view_id) else {
                log::warn!("[Store] switch_view: no view {}", view_id);
                return None;
            };
            let hotbar = target.hotbar_state.hotbar.clone();
            state.sync_active_view();
            state.hotbar = hotbar;
            state.views.active_view_id = view_id.to_string();
            log::debug!("[Store] Switched to view {}", view_id);
            Some(((), Change::containers(hotbar_refs(state))))
        })?;
        Ok(written.is_some())
    }

    pub fn rename_view(&self, view_id: &str, name: &str, icon: Option<&str>) -> Result<bool, StoreError> {
        let name = name.trim();
        let written = self.mutate(ChangeKind::ViewChanged, |state| {
            if name.is_empty() {
                log::warn!("[Store] rename_view: empty name");
                return None;
            }
            let Some(view) = state.views.get_mut(view_id) else {
                log::warn!("[Store] rename_view: no view {}", view_id);
                return None;
            };
            view.name = name.to_string();
            if let Some(icon) = icon {
                view.icon = icon.to_string();
            }
            Some(((), Change::default()))
        })?;
        Ok(written.is_some())
    }

    /// Copy a view (hotbar included) under a new id. The copy is not
    /// activated.
    pub fn duplicate_view(&self, view_id: &str) -> Result<Option<String>, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.mutate(ChangeKind::ViewChanged, |state| {
            let Some(position) = state.views.list.iter().position(|v| v.id == view_id) else {
                log::warn!("[Store] duplicate_view: no view {}", view_id);
                return None;
            };
            let mut copy = state.views.list[position].clone();
            copy.id = id.clone();
            copy.name = format!("{} (Copy)", copy.name);
            state.views.list.insert(position + 1, copy);
            Some((id.clone(), Change::default()))
        })
    }

    /// Push the live hotbar into `view_id`, or the active view if `None`.
    pub fn update_view(&self, view_id: Option<&str>) -> Result<bool, StoreError> {
        let written = self.mutate(ChangeKind::ViewChanged, |state| {
            let target = view_id.map(str::to_string).unwrap_or_else(|| state.views.active_view_id.clone());
            let hotbar = state.hotbar.clone();
            let Some(view) = state.views.get_mut(&target) else {
                log::warn!("[Store] update_view: no view {}", target);
                return None;
            };
            view.hotbar_state.hotbar = hotbar;
            Some(((), Change::default()))
        })?;
        Ok(written.is_some())
    }
}

/// Read-only walk of `path`: true if `write_cell` would land. Only the last
/// hop may need a nested grid created.
fn path_writable(state: &State, path: &CellPath, layout: &DefaultLayout) -> bool {
    let root = path.root;
    let Some(mut grid) = state.container(root.container, root.container_index) else {
        log::warn!("[Store] update_cell: no container {}", root.container_ref());
        return false;
    };
    let mut key = root.slot_key;
    let mut hops = path.nested.iter().peekable();
    while let Some(hop) = hops.next() {
        let Some(parent) = grid.get(key) else {
            log::warn!("[Store] update_cell: parent cell {} of {} has no data", key, path);
            return false;
        };
        match &parent.container_grid {
            Some(nested) => {
                grid = nested;
                key = *hop;
            }
            None if hops.peek().is_none() => {
                let mut created = ContainerGrid::new(layout.nested_rows, layout.nested_cols);
                created.grow_to_fit(*hop);
                if !created.contains_key(*hop) {
                    log::warn!("[Store] update_cell: {} cannot hold {}", path, hop);
                    return false;
                }
                return true;
            }
            None => {
                log::warn!("[Store] update_cell: cell {} of {} has no nested grid", key, path);
                return false;
            }
        }
    }
    if !grid.contains_key(key) {
        log::warn!("[Store] update_cell: {} is outside {}x{}", path, grid.rows, grid.cols);
        return false;
    }
    true
}

/// Walk `path` and write `data` into the addressed cell. The path is checked
/// first, so a refused write leaves `state` untouched.
fn write_cell(state: &mut State, path: &CellPath, data: Option<CellRecord>, layout: &DefaultLayout) -> bool {
    if !path_writable(state, path, layout) {
        return false;
    }
    let root = path.root;
    let Some(mut grid) = state.container_mut(root.container, root.container_index) else {
        return false;
    };
    let mut key = root.slot_key;
    for hop in &path.nested {
        let Some(parent) = grid.get_mut(key) else {
            return false;
        };
        grid = parent.container_grid.get_or_insert_with(|| {
            let mut created = ContainerGrid::new(layout.nested_rows, layout.nested_cols);
            created.grow_to_fit(*hop);
            created
        });
        key = *hop;
    }
    if !grid.set(key, data) {
        return false;
    }
    log::debug!("[Store] update_cell {}", path);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::harness::FailingBackend;
    use quickslot_core::SlotKey;
    use serde_json::json;

    fn hotbar(index: usize, col: usize) -> CellPath {
        CellPath::top(CellLocation::new(ContainerKind::Hotbar, index, SlotKey::new(col, 0)))
    }

    fn record(id: &str) -> CellRecord {
        CellRecord::new(id, id, "")
    }

    fn store_with(backend: Arc<MemoryBackend>) -> PersistenceManager {
        let store = PersistenceManager::new(backend, StoreOptions::default());
        store.bind_owner(OwnerHandle::entity("hero"));
        store
    }

    #[test]
    fn test_fresh_load_scaffolds_without_writing() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        let state = store.load().unwrap();
        assert_eq!(state.hotbar.grids.len(), 3);
        assert_eq!(state.views.list.len(), 1);
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_update_cell_persists_and_syncs_active_view() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        assert!(store.update_cell(&hotbar(0, 1), Some(record("a"))).unwrap());

        let doc = backend.get(&StorageKey::state(&OwnerHandle::entity("hero"))).unwrap();
        assert_eq!(doc["hotbar"]["grids"][0]["items"]["1-0"]["referenceId"], json!("a"));
        assert_eq!(
            doc["views"]["list"][0]["hotbarState"]["hotbar"]["grids"][0]["items"]["1-0"]["referenceId"],
            json!("a")
        );
        assert_eq!(doc["revision"], json!(1));
    }

    #[test]
    fn test_update_cell_ignores_stale_references() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        assert!(!store.update_cell(&hotbar(7, 0), Some(record("a"))).unwrap());
        assert!(!store.update_cell(&hotbar(0, 9), Some(record("a"))).unwrap());
        let popover = CellPath::top(CellLocation::new(ContainerKind::ContainerPopover, 0, SlotKey::new(0, 0)));
        assert!(!store.update_cell(&popover, Some(record("a"))).unwrap());
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_nested_write_requires_parent_and_creates_grid() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let bag = hotbar(0, 0);
        let inside = bag.child(SlotKey::new(1, 2));

        assert!(!store.update_cell(&inside, Some(record("gem"))).unwrap());

        store.update_cell(&bag, Some(record("bag"))).unwrap();
        assert!(store.update_cell(&inside, Some(record("gem"))).unwrap());

        let state = store.load().unwrap();
        let bag_record = state.record_at(&bag).unwrap();
        let grid = bag_record.container_grid.as_ref().unwrap();
        assert_eq!((grid.rows, grid.cols), (4, 4));
        assert_eq!(state.record_at(&inside).map(|r| r.reference_id.as_str()), Some("gem"));
        assert!(state.find_reference("gem", &[]).is_none());
    }

    #[test]
    fn test_refused_nested_write_leaves_cache_untouched() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let bag = hotbar(0, 0);
        store.update_cell(&bag, Some(record("bag"))).unwrap();
        let before = store.load().unwrap();

        let deep = bag.child(SlotKey::new(0, 0)).child(SlotKey::new(1, 1));
        assert!(!store.update_cell(&deep, Some(record("gem"))).unwrap());
        assert!(!store.update_cell(&bag.child(SlotKey::new(usize::MAX, 0)), Some(record("gem"))).unwrap());
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn test_update_cells_is_all_or_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();

        let refused = vec![(hotbar(1, 0), Some(record("a"))), (hotbar(9, 0), None)];
        assert!(!store.update_cells(refused).unwrap());
        assert_eq!(store.find_reference_in_store("a", &[]).map(|l| l.container_index), Some(0));
        assert_eq!(backend.write_count(), 1);

        let moved = vec![(hotbar(1, 0), Some(record("a"))), (hotbar(0, 0), None)];
        assert!(store.update_cells(moved).unwrap());
        assert_eq!(store.find_reference_in_store("a", &[]).map(|l| l.container_index), Some(1));
        assert_eq!(store.load().unwrap().revision, 2);
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn test_nested_write_event_lists_parent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(Arc::new(move |e: &StoreEvent| sink.lock().push(e.clone())));

        let bag = hotbar(1, 0);
        store.update_cell(&bag, Some(record("bag"))).unwrap();
        store.update_cell(&bag.child(SlotKey::new(0, 0)), Some(record("gem"))).unwrap();

        let events = seen.lock();
        let last_change = events
            .iter()
            .rev()
            .find_map(|e| match e {
                StoreEvent::StateChanged(c) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_change.affected, vec![bag.child(SlotKey::new(0, 0)), bag]);
        assert_eq!(events.iter().filter(|e| matches!(e, StoreEvent::Saved(_))).count(), 2);
    }

    #[test]
    fn test_save_failure_propagates_but_cache_is_ahead() {
        let backend = Arc::new(FailingBackend::new());
        let store = PersistenceManager::new(backend.clone(), StoreOptions::default());
        store.bind_owner(OwnerHandle::entity("hero"));
        store.load().unwrap();
        backend.set_failing(true);

        let err = store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.cell_record(&hotbar(0, 0)).unwrap().map(|r| r.reference_id), Some("a".to_string()));
        assert!(!store.should_skip_reload());

        backend.set_failing(false);
        store.update_cell(&hotbar(0, 1), Some(record("b"))).unwrap();
        let doc = backend.stored(&StorageKey::state(&OwnerHandle::entity("hero"))).unwrap();
        assert_eq!(doc["hotbar"]["grids"][0]["items"]["0-0"]["referenceId"], json!("a"));
    }

    #[test]
    fn test_echo_suppression() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        assert!(!store.should_skip_reload());
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();
        assert!(store.should_skip_reload());
        assert!(store.last_saved_at().is_some());

        let revision = store.load().unwrap().revision;
        assert!(store.is_own_revision(revision));
        assert!(!store.handle_external_update(Some(revision)));
        assert!(store.handle_external_update(Some(revision + 100)));
    }

    #[test]
    fn test_bind_owner_invalidates_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();

        store.bind_owner(OwnerHandle::entity("villain"));
        assert_eq!(store.find_reference_in_store("a", &[]), None);
        assert!(store.load().unwrap().hotbar.grids[0].is_empty());

        store.bind_owner(OwnerHandle::entity("hero"));
        store.load().unwrap();
        assert!(store.find_reference_in_store("a", &[]).is_some());
    }

    #[test]
    fn test_legacy_stores_are_migrated_persisted_and_removed() {
        let backend = Arc::new(MemoryBackend::new());
        let owner = OwnerHandle::entity("hero");
        backend.insert(
            StorageKey::legacy(&owner, LegacyBranch::Hotbar),
            json!({ "grids": [{ "rows": 1, "cols": 5, "items": { "0-0": { "referenceId": "a" } } }] }),
        );
        backend.insert(StorageKey::legacy(&owner, LegacyBranch::ActiveSet), json!(2));

        let store = store_with(backend.clone());
        let state = store.load().unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.weapon_sets.active_set, 2);
        assert!(backend.contains(&StorageKey::state(&owner)));
        assert!(!backend.contains(&StorageKey::legacy(&owner, LegacyBranch::Hotbar)));
        assert!(!backend.contains(&StorageKey::legacy(&owner, LegacyBranch::ActiveSet)));
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn test_global_owner_uses_global_key() {
        let backend = Arc::new(MemoryBackend::new());
        let store = PersistenceManager::new(backend.clone(), StoreOptions::default());
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();
        assert!(backend.contains(&StorageKey::state(&OwnerHandle::Global)));
    }

    #[test]
    fn test_update_container_and_clear_all() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let qa = ContainerRef::new(ContainerKind::QuickAccess, 0);
        let mut items = ContainerItems::new();
        items.insert(SlotKey::new(2, 1), Some(record("x")));
        items.insert(SlotKey::new(9, 9), Some(record("y")));
        assert!(store.update_container(qa, items).unwrap());

        let grid = store.container(qa).unwrap().unwrap();
        assert_eq!(grid.items.len(), 1);
        assert!(store.find_reference_in_store("y", &[]).is_none());

        store.update_cell(&hotbar(2, 4), Some(record("z"))).unwrap();
        store.clear_all().unwrap();
        let state = store.load().unwrap();
        assert!(state.occupied_locations().is_empty());
    }

    #[test]
    fn test_active_weapon_set_bounds() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        assert!(store.set_active_weapon_set(2).unwrap());
        assert!(!store.set_active_weapon_set(2).unwrap());
        assert!(!store.set_active_weapon_set(3).unwrap());
        assert_eq!(store.active_weapon_set().unwrap(), 2);
    }

    #[test]
    fn test_resize_conserves_columns() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        store.update_cell(&hotbar(0, 4), Some(record("edge"))).unwrap();

        assert!(!store.resize_hotbar_grids(0, 4, 4).unwrap());
        assert!(!store.resize_hotbar_grids(0, 10, 0).unwrap());
        assert!(!store.resize_hotbar_grids(2, 3, 7).unwrap());
        assert!(store.resize_hotbar_grids(0, 3, 7).unwrap());

        let state = store.load().unwrap();
        assert_eq!(state.hotbar.grids[0].cols + state.hotbar.grids[1].cols, 10);
        let moved = state.find_reference("edge", &[]).unwrap();
        assert_eq!(moved.container_index, 0);
        assert!(moved.slot_key.fits(1, 3));
    }

    #[test]
    fn test_view_lifecycle() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();

        assert!(!store.delete_view("default").unwrap());

        let id = store.create_view("Combat", Some("fas fa-sword")).unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.views.active_view_id, id);
        assert!(state.hotbar.grids.iter().all(|g| g.is_empty()));

        let copy = store.duplicate_view("default").unwrap().unwrap();
        assert_eq!(store.views().unwrap().get(&copy).unwrap().name, "Default (Copy)");
        assert!(store.rename_view(&copy, "  Spare ", None).unwrap());
        assert!(!store.rename_view(&copy, "   ", None).unwrap());
        assert_eq!(store.views().unwrap().get(&copy).unwrap().name, "Spare");

        assert!(store.delete_view(&id).unwrap());
        let state = store.load().unwrap();
        assert_ne!(state.views.active_view_id, id);
        assert_eq!(state.views.list.len(), 2);
        assert!(state.views.active().is_some());
        assert_eq!(state.find_reference("a", &[]).map(|l| l.container_index), Some(0));
    }

    #[test]
    fn test_view_round_trip_restores_hotbar() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        store.update_cell(&hotbar(1, 3), Some(record("a"))).unwrap();
        let before = store.load().unwrap().hotbar;

        let other = store.create_view("Other", None).unwrap();
        store.update_cell(&hotbar(0, 0), Some(record("b"))).unwrap();
        assert!(store.switch_view("default").unwrap());
        assert_eq!(store.load().unwrap().hotbar, before);

        assert!(store.switch_view(&other).unwrap());
        assert!(store.find_reference_in_store("b", &[]).is_some());
        assert!(store.find_reference_in_store("a", &[]).is_none());
        assert!(!store.switch_view("missing").unwrap());
    }

    #[test]
    fn test_update_view_pushes_live_hotbar() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend);
        let copy = store.duplicate_view("default").unwrap().unwrap();
        store.update_cell(&hotbar(0, 0), Some(record("a"))).unwrap();
        assert!(store.views().unwrap().get(&copy).unwrap().hotbar_state.hotbar.grids[0].is_empty());

        assert!(store.update_view(Some(&copy)).unwrap());
        let views = store.views().unwrap();
        assert!(!views.get(&copy).unwrap().hotbar_state.hotbar.grids[0].is_empty());
        assert!(!store.update_view(Some("missing")).unwrap());
    }

    #[test]
    fn test_concurrent_writers_serialize_and_keep_every_change() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(store_with(backend.clone()));
        store.load().unwrap();

        let handles: Vec<_> = (0..5)
            .map(|col| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.update_cell(&hotbar(0, col), Some(record(&format!("r{col}")))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let doc = backend.get(&StorageKey::state(&OwnerHandle::entity("hero"))).unwrap();
        let items = doc["hotbar"]["grids"][0]["items"].as_object().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(doc["revision"], json!(5));
    }

    #[test]
    fn test_explicit_save_updates_cache_and_revision() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        let mut state = store.load().unwrap();
        state.quick_access.grids[0].set(SlotKey::new(0, 0), Some(record("q")));
        store.save(&state).unwrap();

        assert!(store.find_reference_in_store("q", &[]).is_some());
        assert_eq!(store.load().unwrap().revision, 1);
        assert_eq!(backend.write_count(), 1);
    }
}
