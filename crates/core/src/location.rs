//! Container and cell addressing.
//!
//! A top-level cell is addressed by `CellLocation` (container kind, index,
//! slot key). Cells inside a nested popover live in a parent cell's
//! embedded grid, so they are addressed by a `CellPath`: the top-level
//! location of the outermost parent followed by one slot key per nesting
//! level.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slot_key::SlotKey;

/// The four container kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    /// Resizable hotbar grid. Stored per view.
    Hotbar,
    /// Exclusive weapon set. Exactly one set is active.
    WeaponSet,
    /// Auxiliary quick-access grid.
    QuickAccess,
    /// Transient grid backed by a parent cell's embedded container.
    ContainerPopover,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Hotbar => "hotbar",
            ContainerKind::WeaponSet => "weaponSet",
            ContainerKind::QuickAccess => "quickAccess",
            ContainerKind::ContainerPopover => "containerPopover",
        }
    }

    /// Kinds that hold top-level (directly persisted) containers.
    pub fn is_top_level(&self) -> bool {
        !matches!(self, ContainerKind::ContainerPopover)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container: kind plus index within that kind's ordered list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRef {
    pub kind: ContainerKind,
    pub index: usize,
}

impl ContainerRef {
    #[inline]
    pub const fn new(kind: ContainerKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// A cell in a top-level container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLocation {
    pub container: ContainerKind,
    pub container_index: usize,
    pub slot_key: SlotKey,
}

impl CellLocation {
    #[inline]
    pub const fn new(container: ContainerKind, container_index: usize, slot_key: SlotKey) -> Self {
        Self { container, container_index, slot_key }
    }

    pub fn container_ref(&self) -> ContainerRef {
        ContainerRef::new(self.container, self.container_index)
    }
}

impl fmt::Display for CellLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.container, self.container_index, self.slot_key)
    }
}

/// Path from the state root to any cell, nested or not.
///
/// `nested` is empty for top-level cells. Each entry descends into the
/// `containerGrid` embedded in the record at the previous hop.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPath {
    pub root: CellLocation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<SlotKey>,
}

impl CellPath {
    pub fn top(root: CellLocation) -> Self {
        Self { root, nested: Vec::new() }
    }

    /// Path of a cell inside the grid embedded in this path's record.
    pub fn child(&self, slot_key: SlotKey) -> Self {
        let mut nested = self.nested.clone();
        nested.push(slot_key);
        Self { root: self.root, nested }
    }

    /// Path of the cell whose embedded grid holds this cell.
    pub fn parent(&self) -> Option<CellPath> {
        if self.nested.is_empty() {
            return None;
        }
        let mut nested = self.nested.clone();
        nested.pop();
        Some(Self { root: self.root, nested })
    }

    pub fn is_nested(&self) -> bool {
        !self.nested.is_empty()
    }

    /// Slot key of the addressed cell within its own container.
    pub fn slot_key(&self) -> SlotKey {
        self.nested.last().copied().unwrap_or(self.root.slot_key)
    }

    /// True if this path is `ancestor` or lies inside its embedded grid,
    /// at any depth.
    pub fn is_within(&self, ancestor: &CellPath) -> bool {
        self.root == ancestor.root && self.nested.starts_with(&ancestor.nested)
    }

    /// The top-level location, if this path addresses a top-level cell.
    pub fn as_top(&self) -> Option<&CellLocation> {
        if self.nested.is_empty() {
            Some(&self.root)
        } else {
            None
        }
    }
}

impl From<CellLocation> for CellPath {
    fn from(root: CellLocation) -> Self {
        CellPath::top(root)
    }
}

impl fmt::Display for CellPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for key in &self.nested {
            write!(f, "/{}", key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(kind: ContainerKind, index: usize, col: usize, row: usize) -> CellLocation {
        CellLocation::new(kind, index, SlotKey::new(col, row))
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ContainerKind::ContainerPopover).unwrap();
        assert_eq!(json, "\"containerPopover\"");
        let kind: ContainerKind = serde_json::from_str("\"weaponSet\"").unwrap();
        assert_eq!(kind, ContainerKind::WeaponSet);
    }

    #[test]
    fn test_path_child_and_parent() {
        let root = loc(ContainerKind::Hotbar, 1, 2, 0);
        let top = CellPath::top(root);
        assert!(!top.is_nested());
        assert_eq!(top.parent(), None);
        assert_eq!(top.slot_key(), SlotKey::new(2, 0));

        let inner = top.child(SlotKey::new(0, 1));
        assert!(inner.is_nested());
        assert_eq!(inner.slot_key(), SlotKey::new(0, 1));
        assert_eq!(inner.parent(), Some(top.clone()));
        assert_eq!(inner.as_top(), None);
        assert_eq!(inner.to_string(), "hotbar[1]:2-0/0-1");
    }

    #[test]
    fn test_is_within() {
        let bag = CellPath::top(loc(ContainerKind::Hotbar, 0, 0, 0));
        let deep = bag.child(SlotKey::new(1, 1)).child(SlotKey::new(0, 0));
        assert!(deep.is_within(&bag));
        assert!(bag.is_within(&bag));
        assert!(!bag.is_within(&deep));
        assert!(!deep.is_within(&CellPath::top(loc(ContainerKind::Hotbar, 0, 1, 0))));
    }

    #[test]
    fn test_location_display() {
        let l = loc(ContainerKind::QuickAccess, 0, 1, 1);
        assert_eq!(l.to_string(), "quickAccess[0]:1-1");
        assert_eq!(l.container_ref(), ContainerRef::new(ContainerKind::QuickAccess, 0));
    }
}
