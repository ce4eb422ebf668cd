//! Interaction coordinator.
//!
//! Turns clicks, drags, and drops on cells into validated store mutations.
//! The only state is the remembered drag source; a new drag start replaces
//! it and a drag end clears it.
//!
//! Every mutating path paints first and persists second, so a failed write
//! leaves the display ahead of durable state, never behind it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use quickslot_core::{CellLocation, CellPath, ContainerKind, ContainerRef, OwnerHandle, SlotKey};

use crate::adapter::{Document, DocumentSource, LogNotifier, Notifier, NullRenderer, SlotRenderer, SystemAdapter};
use crate::error::StoreError;
use crate::model::{CellRecord, ContainerGrid, ContainerItems, RecordKind, ReferenceExclusion};
use crate::nested;
use crate::resolver::{self, CellContext};
use crate::store::PersistenceManager;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(CellContext),
}

/// What a drop carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragPayload {
    /// Dragged from another cell.
    Slot { slot_key: SlotKey },
    /// Dragged in from outside (a sheet, a directory).
    Document { reference_id: String },
}

/// Why a gesture was refused. Nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InactiveSet,
    Locked,
    CrossPopover,
    IntoItself,
    Duplicate { reference_id: String, existing: CellLocation },
    NotOwned { reference_id: String },
    Blocked { reference_id: String },
    Unresolved { reference_id: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InactiveSet => write!(f, "That weapon set is not active"),
            Rejection::Locked => write!(f, "That slot is locked"),
            Rejection::CrossPopover => write!(f, "Items cannot be moved directly in or out of a container"),
            Rejection::IntoItself => write!(f, "A container cannot be placed inside itself"),
            Rejection::Duplicate { existing, .. } => write!(f, "That item is already on the hotbar at {}", existing),
            Rejection::NotOwned { reference_id } => write!(f, "{} does not belong to this character", reference_id),
            Rejection::Blocked { reference_id } => write!(f, "{} cannot be placed on the hotbar", reference_id),
            Rejection::Unresolved { reference_id } => write!(f, "Could not find {}", reference_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Swapped,
    Moved,
    Placed,
    NoChange,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Empty cell, or a cell in an inactive weapon set.
    Ignored,
    ExecutedMacro,
    /// The cell holds a container; its reconciled interior.
    OpenedContainer(ContainerGrid),
    Used,
}

pub struct InteractionCoordinator {
    store: Arc<PersistenceManager>,
    documents: Arc<dyn DocumentSource>,
    adapter: Arc<dyn SystemAdapter>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn SlotRenderer>,
    drag: DragState,
}

impl InteractionCoordinator {
    pub fn new(
        store: Arc<PersistenceManager>,
        documents: Arc<dyn DocumentSource>,
        adapter: Arc<dyn SystemAdapter>,
    ) -> Self {
        Self {
            store,
            documents,
            adapter,
            notifier: Arc::new(LogNotifier),
            renderer: Arc::new(NullRenderer),
            drag: DragState::Idle,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn SlotRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Swap in a system adapter registered after construction.
    pub fn rebind(&mut self, adapter: Arc<dyn SystemAdapter>) {
        self.adapter = adapter;
    }

    pub fn store(&self) -> &Arc<PersistenceManager> {
        &self.store
    }

    /// Bind the store to the document source's current owner.
    pub fn bind_current_owner(&self) {
        self.store.bind_owner(self.documents.current_owner());
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    fn reject(&self, rejection: Rejection) -> DropOutcome {
        log::warn!("[Coordinator] Rejected: {:?}", rejection);
        self.notifier.warn(&rejection.to_string());
        DropOutcome::Rejected(rejection)
    }

    fn is_inactive_set(&self, cell: &CellContext) -> Result<bool, StoreError> {
        if !resolver::is_exclusive_set(cell) {
            return Ok(false);
        }
        Ok(resolver::is_inactive_exclusive_set(cell, self.store.active_weapon_set()?))
    }

    /// Two-handed recompute for a weapon-set cell.
    fn notify_set_change(&self, path: &CellPath) {
        if let Some(loc) = path.as_top() {
            if loc.container == ContainerKind::WeaponSet {
                self.adapter.on_exclusive_set_cell_updated(loc.container_index, loc.slot_key);
            }
        }
    }

    /// Where else `reference_id` sits, ignoring the cells taking part in the
    /// gesture. Weapon-set and nested destinations allow duplicates.
    fn conflict(&self, reference_id: &str, destination: &CellPath, participants: &[&CellPath]) -> Option<CellLocation> {
        let dest = destination.as_top()?;
        if dest.container == ContainerKind::WeaponSet {
            return None;
        }
        let exclude: Vec<ReferenceExclusion> =
            participants.iter().filter_map(|p| p.as_top()).map(ReferenceExclusion::at).collect();
        self.store.find_reference_in_store(reference_id, &exclude)
    }

    // =========================================================================
    // Click
    // =========================================================================

    pub fn handle_click(&self, cell: &CellContext) -> Result<ClickOutcome, StoreError> {
        let path = resolver::path_of(cell);
        let Some(record) = self.store.cell_record(&path)? else {
            return Ok(ClickOutcome::Ignored);
        };
        if self.is_inactive_set(cell)? {
            log::debug!("[Coordinator] Click on inactive set cell {}", path);
            return Ok(ClickOutcome::Ignored);
        }
        let owner = self.store.owner();
        if record.is_macro() {
            self.adapter.execute_macro(&record, &owner);
            return Ok(ClickOutcome::ExecutedMacro);
        }
        if self.adapter.is_container_reference(&record) {
            if let Some(grid) = self.open_popover(cell)? {
                return Ok(ClickOutcome::OpenedContainer(grid));
            }
        }
        self.adapter.use_item(&record, &owner);
        Ok(ClickOutcome::Used)
    }

    /// Reconcile a container cell's saved interior with its live contents
    /// and persist the result into the cell.
    pub fn open_popover(&self, cell: &CellContext) -> Result<Option<ContainerGrid>, StoreError> {
        let path = resolver::path_of(cell);
        let Some(record) = self.store.cell_record(&path)? else {
            log::debug!("[Coordinator] open_popover on empty cell {}", path);
            return Ok(None);
        };
        let owner = self.store.owner();
        let Some(contents) = self.adapter.container_contents(&record, &owner) else {
            log::warn!("[Coordinator] No contents for container '{}'", record.reference_id);
            return Ok(None);
        };
        let reconciled = nested::reconcile(record.container_grid.as_ref(), &contents);
        for dropped in &reconciled.unplaced {
            self.notifier.info(&format!("{} does not fit in {}", dropped.display_name, record.display_name));
        }
        if record.container_grid.as_ref() != Some(&reconciled.grid) {
            let mut updated = record;
            updated.container_grid = Some(reconciled.grid.clone());
            self.renderer.paint(&path, Some(&updated));
            self.store.update_cell(&path, Some(updated))?;
        }
        Ok(Some(reconciled.grid))
    }

    // =========================================================================
    // Drag and drop
    // =========================================================================

    pub fn handle_drag_start(&mut self, cell: &CellContext) -> Result<bool, StoreError> {
        if self.is_inactive_set(cell)? {
            log::debug!("[Coordinator] Drag from inactive set refused");
            return Ok(false);
        }
        if let DragState::Dragging(previous) = &self.drag {
            log::debug!("[Coordinator] Drag source {} replaced", resolver::path_of(previous));
        }
        self.drag = DragState::Dragging(cell.clone());
        Ok(true)
    }

    pub fn handle_drag_end(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn handle_drop(&mut self, target: &CellContext, payload: &DragPayload) -> Result<DropOutcome, StoreError> {
        let remembered = std::mem::take(&mut self.drag);

        if self.is_inactive_set(target)? {
            return Ok(self.reject(Rejection::InactiveSet));
        }
        if self.adapter.is_slot_locked(&resolver::classify(target), target.slot_key) {
            return Ok(self.reject(Rejection::Locked));
        }

        match payload {
            DragPayload::Slot { slot_key } => match remembered {
                DragState::Dragging(source) if source.slot_key == *slot_key => self.drop_internal(&source, target),
                _ => {
                    log::debug!("[Coordinator] Slot drop with no matching drag source");
                    Ok(DropOutcome::NoChange)
                }
            },
            DragPayload::Document { reference_id } => self.drop_external(target, reference_id),
        }
    }

    fn drop_internal(&self, source: &CellContext, target: &CellContext) -> Result<DropOutcome, StoreError> {
        let source_path = resolver::path_of(source);
        let target_path = resolver::path_of(target);
        if source_path == target_path {
            return Ok(DropOutcome::NoChange);
        }

        let same_container = resolver::same_container(source, target);
        if !same_container && resolver::classify(source).is_nested() != resolver::classify(target).is_nested() {
            return Ok(self.reject(Rejection::CrossPopover));
        }
        if target_path.is_within(&source_path) {
            return Ok(self.reject(Rejection::IntoItself));
        }

        let Some(moving) = self.store.cell_record(&source_path)? else {
            log::debug!("[Coordinator] Drag source {} is empty", source_path);
            return Ok(DropOutcome::NoChange);
        };
        let displaced = self.store.cell_record(&target_path)?;

        let participants = [&source_path, &target_path];
        if let Some(existing) = self.conflict(&moving.reference_id, &target_path, &participants) {
            let reference_id = moving.reference_id.clone();
            return Ok(self.reject(Rejection::Duplicate { reference_id, existing }));
        }
        if let Some(displaced) = &displaced {
            if let Some(existing) = self.conflict(&displaced.reference_id, &source_path, &participants) {
                let reference_id = displaced.reference_id.clone();
                return Ok(self.reject(Rejection::Duplicate { reference_id, existing }));
            }
        }

        let outcome = if same_container || displaced.is_some() { DropOutcome::Swapped } else { DropOutcome::Moved };

        self.renderer.paint(&target_path, Some(&moving));
        self.renderer.paint(&source_path, displaced.as_ref());
        self.notify_set_change(&source_path);
        self.notify_set_change(&target_path);

        let writes = vec![(target_path.clone(), Some(moving)), (source_path.clone(), displaced)];
        if !self.store.update_cells(writes)? {
            return Ok(DropOutcome::NoChange);
        }
        log::debug!("[Coordinator] {:?} {} -> {}", outcome, source_path, target_path);
        Ok(outcome)
    }

    fn drop_external(&self, target: &CellContext, reference_id: &str) -> Result<DropOutcome, StoreError> {
        let Some(doc) = self.documents.resolve_reference(reference_id) else {
            return Ok(self.reject(Rejection::Unresolved { reference_id: reference_id.to_string() }));
        };
        if doc.kind != RecordKind::Macro {
            if !doc.is_owned_by(&self.store.owner()) {
                return Ok(self.reject(Rejection::NotOwned { reference_id: doc.reference_id }));
            }
            if self.adapter.is_blocked(&doc) {
                return Ok(self.reject(Rejection::Blocked { reference_id: doc.reference_id }));
            }
        }

        let record = self.record_for(&doc);
        let target_path = resolver::path_of(target);
        // Loads state, so the uniqueness scan below sees the cache.
        self.store.cell_record(&target_path)?;
        if let Some(existing) = self.conflict(&record.reference_id, &target_path, &[&target_path]) {
            let reference_id = record.reference_id.clone();
            return Ok(self.reject(Rejection::Duplicate { reference_id, existing }));
        }

        self.renderer.paint(&target_path, Some(&record));
        self.notify_set_change(&target_path);
        if !self.store.update_cell(&target_path, Some(record))? {
            return Ok(DropOutcome::NoChange);
        }
        Ok(DropOutcome::Placed)
    }

    fn record_for(&self, doc: &Document) -> CellRecord {
        self.adapter.transform(doc).unwrap_or_else(|| CellRecord::minimal(doc))
    }

    /// Empty a cell.
    pub fn remove_cell(&self, cell: &CellContext) -> Result<bool, StoreError> {
        if self.is_inactive_set(cell)? {
            log::debug!("[Coordinator] Remove on inactive set refused");
            return Ok(false);
        }
        let path = resolver::path_of(cell);
        self.renderer.paint(&path, None);
        let written = self.store.update_cell(&path, None)?;
        self.notify_set_change(&path);
        Ok(written)
    }

    // =========================================================================
    // Container operations
    // =========================================================================

    pub fn sort_container(&self, container: ContainerRef) -> Result<bool, StoreError> {
        self.replace_container(container, |adapter, grid, _| adapter.sort_container(grid))
    }

    /// Fill a container from the adapter. References already present
    /// elsewhere are left out, except in weapon sets.
    pub fn auto_populate_container(&self, container: ContainerRef) -> Result<bool, StoreError> {
        let store = self.store.clone();
        self.replace_container(container, move |adapter, grid, owner| {
            let mut items = adapter.auto_populate(grid, owner);
            if container.kind == ContainerKind::WeaponSet {
                return items;
            }
            let exclude = [ReferenceExclusion::container(container)];
            let mut seen = HashSet::new();
            let before = items.values().flatten().count();
            items.retain(|_, cell| match cell {
                None => true,
                Some(record) => {
                    seen.insert(record.reference_id.clone())
                        && store.find_reference_in_store(&record.reference_id, &exclude).is_none()
                }
            });
            let skipped = before - items.values().flatten().count();
            if skipped > 0 {
                log::debug!("[Coordinator] auto-populate skipped {} duplicate references", skipped);
            }
            items
        })
    }

    pub fn clear_container(&self, container: ContainerRef) -> Result<bool, StoreError> {
        self.replace_container(container, |adapter, grid, _| adapter.clear_container(grid))
    }

    fn replace_container(
        &self,
        container: ContainerRef,
        build: impl FnOnce(&dyn SystemAdapter, &ContainerGrid, &OwnerHandle) -> ContainerItems,
    ) -> Result<bool, StoreError> {
        let Some(grid) = self.store.container(container)? else {
            log::warn!("[Coordinator] No container {}", container);
            return Ok(false);
        };
        if container.kind == ContainerKind::WeaponSet && container.index != self.store.active_weapon_set()? {
            self.notifier.warn(&Rejection::InactiveSet.to_string());
            return Ok(false);
        }
        let owner = self.store.owner();
        let items = build(self.adapter.as_ref(), &grid, &owner);
        for key in SlotKey::all(grid.rows, grid.cols) {
            let path = CellPath::top(CellLocation::new(container.kind, container.index, key));
            self.renderer.paint(&path, items.get(&key).and_then(|r| r.as_ref()));
        }
        self.store.update_container(container, items)
    }
}
