//! State-changed notifications.
//!
//! The store emits these after every in-memory mutation so a rendering layer
//! can repaint exactly the affected cells, independent of any host engine's
//! hook names. Every event carries the revision that produced it, which
//! also lets a listener tell its own writes apart from external ones.

use std::sync::Arc;

use quickslot_core::{CellPath, ContainerRef, OwnerHandle};

/// What kind of mutation produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// One cell (possibly nested) was written.
    CellUpdated,
    /// A container's items were replaced wholesale.
    ContainerReplaced,
    /// Every container was emptied.
    Cleared,
    /// The view list or the active view changed.
    ViewChanged,
    /// A different weapon set became active.
    ActiveSetChanged,
    /// Adjacent hotbar grids were resized.
    Resized,
    /// Cached state was dropped after an external change.
    Reloaded,
}

/// Events emitted by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    StateChanged(StateChangedEvent),
    /// A document reached durable storage.
    Saved(SavedEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    pub kind: ChangeKind,
    pub owner: OwnerHandle,
    /// Cells whose content changed. For a nested write this includes the
    /// parent cell, whose record embeds the nested grid.
    pub affected: Vec<CellPath>,
    /// Whole containers that changed (container replacement, clears, view
    /// switches).
    pub containers: Vec<ContainerRef>,
    /// Revision after the mutation.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedEvent {
    pub owner: OwnerHandle,
    pub revision: u64,
}

/// Callback type for receiving store events. Listeners run with no store
/// lock held and may call back into the store.
pub type StateListener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Simple event collector for testing.
#[derive(Default)]
pub struct EventCollector {
    events: Vec<StoreEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: StoreEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[StoreEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Filter to only StateChanged events.
    pub fn state_changed(&self) -> Vec<&StateChangedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::StateChanged(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Filter to only Saved events.
    pub fn saved(&self) -> Vec<&SavedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::Saved(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}
