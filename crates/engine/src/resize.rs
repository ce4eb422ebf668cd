//! Column resize between two adjacent hotbar grids.
//!
//! The combined column count of the pair is fixed when the gesture begins;
//! every intermediate position conserves it and keeps both sides at one
//! column or more.

use quickslot_core::{ContainerKind, ContainerRef};

use crate::error::StoreError;
use crate::store::PersistenceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeGesture {
    left_index: usize,
    start_left: usize,
    total: usize,
    left: usize,
}

impl ResizeGesture {
    /// Start resizing grids `left_index` and `left_index + 1`. `None` if the
    /// pair does not exist.
    pub fn begin(store: &PersistenceManager, left_index: usize) -> Result<Option<Self>, StoreError> {
        let left = store.container(ContainerRef::new(ContainerKind::Hotbar, left_index))?;
        let right = store.container(ContainerRef::new(ContainerKind::Hotbar, left_index + 1))?;
        let (Some(left), Some(right)) = (left, right) else {
            log::warn!("[Coordinator] No hotbar grid pair at {}", left_index);
            return Ok(None);
        };
        Ok(Some(Self::from_columns(left_index, left.cols, right.cols)))
    }

    pub fn from_columns(left_index: usize, left_cols: usize, right_cols: usize) -> Self {
        let total = left_cols + right_cols;
        Self { left_index, start_left: left_cols, total, left: left_cols }
    }

    /// Move the divider `delta` columns (positive grows the left grid).
    pub fn update(&mut self, delta: isize) -> (usize, usize) {
        if self.total < 2 {
            return self.columns();
        }
        let wanted = self.start_left as isize + delta;
        self.left = wanted.clamp(1, self.total as isize - 1) as usize;
        self.columns()
    }

    /// Move the divider by a pointer offset, snapping to whole columns.
    pub fn update_pixels(&mut self, dx: f32, column_width: f32) -> (usize, usize) {
        if column_width <= 0.0 {
            return self.columns();
        }
        self.update((dx / column_width).round() as isize)
    }

    /// `(left, right)` column counts.
    pub fn columns(&self) -> (usize, usize) {
        (self.left, self.total - self.left)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Persist the final columns. An unchanged gesture writes nothing.
    pub fn finish(self, store: &PersistenceManager) -> Result<bool, StoreError> {
        if self.left == self.start_left {
            return Ok(false);
        }
        let (left, right) = self.columns();
        store.resize_hotbar_grids(self.left_index, left, right)
    }
}
