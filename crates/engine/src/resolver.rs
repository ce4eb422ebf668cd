//! Container type resolution.
//!
//! The rendering layer describes where a cell sits as a stack of container
//! markers (innermost first). Resolution is a single match over the closed
//! set of container kinds, with a fixed priority: nested popover, then
//! exclusive set, then quick access, then hotbar grid by index.

use quickslot_core::{CellLocation, CellPath, ContainerKind, SlotKey};

/// A structural container enclosing a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerMarker {
    Hotbar { index: usize },
    WeaponSet { index: usize },
    QuickAccess { index: usize },
    /// A bag's interior, backed by the record at `parent`.
    Popover { parent: CellPath },
}

/// A cell as the rendering layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellContext {
    pub slot_key: SlotKey,
    /// Enclosing containers, innermost first.
    pub ancestors: Vec<ContainerMarker>,
}

impl CellContext {
    pub fn new(slot_key: SlotKey, ancestors: Vec<ContainerMarker>) -> Self {
        Self { slot_key, ancestors }
    }

    /// Context of a top-level cell.
    pub fn top(location: CellLocation) -> Self {
        let marker = match location.container {
            ContainerKind::Hotbar => ContainerMarker::Hotbar { index: location.container_index },
            ContainerKind::WeaponSet => ContainerMarker::WeaponSet { index: location.container_index },
            ContainerKind::QuickAccess => ContainerMarker::QuickAccess { index: location.container_index },
            ContainerKind::ContainerPopover => {
                log::warn!("[Resolver] Popover cell {} built without a parent", location);
                ContainerMarker::Hotbar { index: location.container_index }
            }
        };
        Self { slot_key: location.slot_key, ancestors: vec![marker] }
    }

    /// Context of a cell inside the popover opened from `parent`.
    pub fn nested(parent: CellPath, slot_key: SlotKey) -> Self {
        Self { slot_key, ancestors: vec![ContainerMarker::Popover { parent }] }
    }

    pub fn path(&self) -> CellPath {
        path_of(self)
    }
}

/// Resolved container of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContainer {
    pub kind: ContainerKind,
    pub index: usize,
    /// The owning cell, for popovers.
    pub parent: Option<CellPath>,
}

impl ResolvedContainer {
    pub fn is_nested(&self) -> bool {
        self.kind == ContainerKind::ContainerPopover
    }
}

pub fn classify(cell: &CellContext) -> ResolvedContainer {
    if let Some(parent) = cell.ancestors.iter().find_map(|m| match m {
        ContainerMarker::Popover { parent } => Some(parent),
        _ => None,
    }) {
        return ResolvedContainer { kind: ContainerKind::ContainerPopover, index: 0, parent: Some(parent.clone()) };
    }
    if let Some(index) = cell.ancestors.iter().find_map(|m| match m {
        ContainerMarker::WeaponSet { index } => Some(*index),
        _ => None,
    }) {
        return ResolvedContainer { kind: ContainerKind::WeaponSet, index, parent: None };
    }
    if let Some(index) = cell.ancestors.iter().find_map(|m| match m {
        ContainerMarker::QuickAccess { index } => Some(*index),
        _ => None,
    }) {
        return ResolvedContainer { kind: ContainerKind::QuickAccess, index, parent: None };
    }
    let index = cell
        .ancestors
        .iter()
        .find_map(|m| match m {
            ContainerMarker::Hotbar { index } => Some(*index),
            _ => None,
        })
        .unwrap_or_else(|| {
            log::debug!("[Resolver] Cell {} has no container marker, assuming hotbar 0", cell.slot_key);
            0
        });
    ResolvedContainer { kind: ContainerKind::Hotbar, index, parent: None }
}

/// Store address of the cell.
pub fn path_of(cell: &CellContext) -> CellPath {
    let resolved = classify(cell);
    match resolved.parent {
        Some(parent) => parent.child(cell.slot_key),
        None => CellPath::top(CellLocation::new(resolved.kind, resolved.index, cell.slot_key)),
    }
}

pub fn is_exclusive_set(cell: &CellContext) -> bool {
    classify(cell).kind == ContainerKind::WeaponSet
}

pub fn is_active_exclusive_set(cell: &CellContext, active_index: usize) -> bool {
    let resolved = classify(cell);
    resolved.kind == ContainerKind::WeaponSet && resolved.index == active_index
}

/// An exclusive set other than the active one. Such cells reject mutation.
pub fn is_inactive_exclusive_set(cell: &CellContext, active_index: usize) -> bool {
    let resolved = classify(cell);
    resolved.kind == ContainerKind::WeaponSet && resolved.index != active_index
}

/// Kind and index match (and, for popovers, the owning cell).
pub fn same_container(a: &CellContext, b: &CellContext) -> bool {
    classify(a) == classify(b)
}

/// `"col-row"`.
pub fn slot_key_of(cell: &CellContext) -> String {
    cell.slot_key.to_string()
}
