//! Nested container reconciliation.
//!
//! When a bag is opened, its live contents are matched against the grid
//! saved in the bag's cell. Records keep their saved slot while their
//! reference is still in the bag; vanished records are dropped; new ones
//! take the first free slot.

use std::collections::HashSet;

use quickslot_core::SlotKey;

use crate::adapter::ContainerContents;
use crate::model::{CellRecord, ContainerGrid};

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub grid: ContainerGrid,
    /// Records with no free slot left.
    pub unplaced: Vec<CellRecord>,
}

pub fn reconcile(saved: Option<&ContainerGrid>, contents: &ContainerContents) -> Reconciled {
    let mut grid = ContainerGrid::new(contents.rows.max(1), contents.cols.max(1));
    let mut pending = Vec::new();
    let mut claimed: HashSet<SlotKey> = HashSet::new();

    for fresh in &contents.items {
        let previous = saved.and_then(|s| {
            s.occupied()
                .find(|(k, r)| r.reference_id == fresh.reference_id && !claimed.contains(k))
        });
        match previous {
            Some((key, old)) if grid.contains_key(key) => {
                let mut record = fresh.clone();
                if record.container_grid.is_none() {
                    record.container_grid = old.container_grid.clone();
                }
                claimed.insert(key);
                grid.set(key, Some(record));
            }
            _ => pending.push(fresh.clone()),
        }
    }

    let mut unplaced = Vec::new();
    for record in pending {
        match grid.first_free_slot() {
            Some(key) => {
                grid.set(key, Some(record));
            }
            None => {
                log::warn!("[Coordinator] No free slot for '{}' in container", record.reference_id);
                unplaced.push(record);
            }
        }
    }
    Reconciled { grid, unplaced }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> CellRecord {
        CellRecord::new(id, id, "")
    }

    #[test]
    fn test_fresh_open_fills_row_major() {
        let contents = ContainerContents { rows: 1, cols: 3, items: vec![record("a"), record("b")] };
        let out = reconcile(None, &contents);
        assert_eq!(out.grid.get(SlotKey::new(0, 0)).map(|r| r.reference_id.as_str()), Some("a"));
        assert_eq!(out.grid.get(SlotKey::new(1, 0)).map(|r| r.reference_id.as_str()), Some("b"));
        assert!(out.unplaced.is_empty());
    }

    #[test]
    fn test_saved_positions_survive_and_stale_items_drop() {
        let mut saved = ContainerGrid::new(2, 2);
        saved.set(SlotKey::new(1, 1), Some(record("a")));
        saved.set(SlotKey::new(0, 0), Some(record("gone")));

        let contents = ContainerContents { rows: 2, cols: 2, items: vec![record("new"), record("a")] };
        let out = reconcile(Some(&saved), &contents);
        assert_eq!(out.grid.get(SlotKey::new(1, 1)).map(|r| r.reference_id.as_str()), Some("a"));
        assert_eq!(out.grid.get(SlotKey::new(0, 0)).map(|r| r.reference_id.as_str()), Some("new"));
        assert_eq!(out.grid.occupied().count(), 2);
    }

    #[test]
    fn test_overflow_is_reported() {
        let contents = ContainerContents { rows: 1, cols: 1, items: vec![record("a"), record("b")] };
        let out = reconcile(None, &contents);
        assert_eq!(out.unplaced.len(), 1);
        assert_eq!(out.unplaced[0].reference_id, "b");
    }
}
