//! Collaborator contracts.
//!
//! The coordinator never reaches into a host engine directly. Everything
//! system specific (document lookup, record transforms, item use, sorting)
//! comes in through these traits, injected at construction.

use serde_json::Value;

use quickslot_core::{CellPath, OwnerHandle, SlotKey};

use crate::model::{CellRecord, ContainerGrid, ContainerItems, RecordKind};
use crate::resolver::ResolvedContainer;

/// An externally owned document a cell can point at.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub reference_id: String,
    pub name: String,
    pub img: String,
    pub kind: RecordKind,
    /// Owning entity id; `None` for world-level documents.
    pub owner: Option<String>,
    /// System-specific payload for the adapter's transform.
    pub data: Value,
}

impl Document {
    pub fn new(reference_id: impl Into<String>, name: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            reference_id: reference_id.into(),
            name: name.into(),
            img: String::new(),
            kind,
            owner: None,
            data: Value::Null,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Whether the document belongs to `owner`. The global owner matches
    /// unowned documents.
    pub fn is_owned_by(&self, owner: &OwnerHandle) -> bool {
        self.owner.as_deref() == owner.entity_id()
    }
}

impl CellRecord {
    /// Fallback transform: reference, name, image, kind.
    pub fn minimal(doc: &Document) -> Self {
        CellRecord::new(&doc.reference_id, &doc.name, &doc.img).with_kind(doc.kind.clone())
    }
}

/// Resolves references and reports the current owner.
pub trait DocumentSource: Send + Sync {
    fn resolve_reference(&self, reference_id: &str) -> Option<Document>;
    fn current_owner(&self) -> OwnerHandle;
}

/// Contents of a container item, used to fill its popover.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerContents {
    pub rows: usize,
    pub cols: usize,
    pub items: Vec<CellRecord>,
}

/// System-specific behavior. Every method has a neutral default, so an
/// adapter only overrides what its system supports.
pub trait SystemAdapter: Send + Sync {
    /// Build a cell record from a document. `None` uses `CellRecord::minimal`.
    fn transform(&self, _doc: &Document) -> Option<CellRecord> {
        None
    }

    fn is_container_reference(&self, _record: &CellRecord) -> bool {
        false
    }

    fn container_contents(&self, _record: &CellRecord, _owner: &OwnerHandle) -> Option<ContainerContents> {
        None
    }

    /// Two-handed equipment recompute after an exclusive-set cell changed.
    fn on_exclusive_set_cell_updated(&self, _set_index: usize, _slot_key: SlotKey) {}

    fn is_slot_locked(&self, _container: &ResolvedContainer, _slot_key: SlotKey) -> bool {
        false
    }

    /// Documents of this kind may not be placed at all.
    fn is_blocked(&self, _doc: &Document) -> bool {
        false
    }

    fn use_item(&self, _record: &CellRecord, _owner: &OwnerHandle) {}

    fn execute_macro(&self, _record: &CellRecord, _owner: &OwnerHandle) {}

    fn sort_container(&self, grid: &ContainerGrid) -> ContainerItems {
        grid.items.clone()
    }

    fn auto_populate(&self, grid: &ContainerGrid, _owner: &OwnerHandle) -> ContainerItems {
        grid.items.clone()
    }

    fn clear_container(&self, _grid: &ContainerGrid) -> ContainerItems {
        ContainerItems::new()
    }
}

/// Adapter with every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAdapter;

impl SystemAdapter for DefaultAdapter {}

/// User-facing messages. Fire and forget.
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn warn(&self, message: &str) {
        log::warn!("[Notify] {}", message);
    }

    fn info(&self, message: &str) {
        log::info!("[Notify] {}", message);
    }
}

/// Optimistic visual updates, applied before persistence.
pub trait SlotRenderer: Send + Sync {
    fn paint(&self, path: &CellPath, record: Option<&CellRecord>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl SlotRenderer for NullRenderer {
    fn paint(&self, _path: &CellPath, _record: Option<&CellRecord>) {}
}
