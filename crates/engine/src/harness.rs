//! Test harness for store and coordinator behavior.
//!
//! This module provides `CoordinatorHarness`, which wires an
//! `InteractionCoordinator` to scripted collaborators that:
//! - Record every paint, two-handed hook call, and durable write in one
//!   shared operation log, so tests can assert ordering
//! - Record user-facing warnings
//! - Let a test fail durable writes on demand
//!
//! Use this harness to test interaction rules without a rendering layer or a
//! host engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use quickslot_core::{CellPath, ContainerKind, OwnerHandle, SlotKey};

use crate::adapter::{ContainerContents, Document, DocumentSource, Notifier, SlotRenderer, SystemAdapter};
use crate::backend::{DocumentBackend, MemoryBackend, StorageKey};
use crate::coordinator::{DragPayload, DropOutcome, InteractionCoordinator};
use crate::error::StoreError;
use crate::model::{CellRecord, ContainerGrid, ContainerItems, RecordKind};
use crate::resolver::{CellContext, ResolvedContainer};
use crate::store::{PersistenceManager, StoreOptions};

/// Shared, ordered log of side effects.
pub type OpLog = Arc<Mutex<Vec<String>>>;

/// Memory backend whose writes can be made to fail.
#[derive(Default)]
pub struct FailingBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
    log: OpLog,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: OpLog) -> Self {
        Self { log, ..Self::default() }
    }

    /// While set, `write` and `remove` return `StoreError::Backend`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, key: &StorageKey) -> Option<Value> {
        self.inner.get(key)
    }

    pub fn write_count(&self) -> usize {
        self.inner.write_count()
    }

    fn check(&self, op: &str, key: &StorageKey) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("simulated {} failure for {}", op, key)));
        }
        Ok(())
    }
}

impl DocumentBackend for FailingBackend {
    fn read(&self, key: &StorageKey) -> Result<Option<Value>, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &StorageKey, doc: &Value) -> Result<(), StoreError> {
        self.check("write", key)?;
        self.log.lock().push(format!("write {}", key));
        self.inner.write(key, doc)
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.check("remove", key)?;
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        self.inner.keys()
    }
}

/// Collects user-facing messages.
#[derive(Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }
}

/// Logs `paint <path> <referenceId|->`.
pub struct RecordingRenderer {
    log: OpLog,
}

impl RecordingRenderer {
    pub fn new(log: OpLog) -> Self {
        Self { log }
    }
}

impl SlotRenderer for RecordingRenderer {
    fn paint(&self, path: &CellPath, record: Option<&CellRecord>) {
        let shown = record.map_or("-", |r| r.reference_id.as_str());
        self.log.lock().push(format!("paint {} {}", path, shown));
    }
}

/// In-memory document directory.
pub struct ScriptedDocuments {
    docs: Mutex<HashMap<String, Document>>,
    owner: Mutex<OwnerHandle>,
}

impl ScriptedDocuments {
    pub fn new(owner: OwnerHandle) -> Self {
        Self { docs: Mutex::new(HashMap::new()), owner: Mutex::new(owner) }
    }

    pub fn add(&self, doc: Document) {
        self.docs.lock().insert(doc.reference_id.clone(), doc);
    }

    /// Add an item owned by the current owner.
    pub fn add_item(&self, reference_id: &str, name: &str) {
        let mut doc = Document::new(reference_id, name, RecordKind::Item);
        doc.owner = self.owner.lock().entity_id().map(str::to_string);
        self.add(doc);
    }

    pub fn set_owner(&self, owner: OwnerHandle) {
        *self.owner.lock() = owner;
    }
}

impl DocumentSource for ScriptedDocuments {
    fn resolve_reference(&self, reference_id: &str) -> Option<Document> {
        self.docs.lock().get(reference_id).cloned()
    }

    fn current_owner(&self) -> OwnerHandle {
        self.owner.lock().clone()
    }
}

/// Adapter with scripted answers and recorded calls.
pub struct ScriptedAdapter {
    log: OpLog,
    locked: Mutex<HashSet<(ContainerKind, usize, SlotKey)>>,
    blocked: Mutex<HashSet<String>>,
    contents: Mutex<HashMap<String, ContainerContents>>,
    population: Mutex<Vec<CellRecord>>,
    set_updates: Mutex<Vec<(usize, SlotKey)>>,
    used: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(log: OpLog) -> Self {
        Self {
            log,
            locked: Mutex::new(HashSet::new()),
            blocked: Mutex::new(HashSet::new()),
            contents: Mutex::new(HashMap::new()),
            population: Mutex::new(Vec::new()),
            set_updates: Mutex::new(Vec::new()),
            used: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self, kind: ContainerKind, index: usize, slot_key: SlotKey) {
        self.locked.lock().insert((kind, index, slot_key));
    }

    pub fn block(&self, reference_id: &str) {
        self.blocked.lock().insert(reference_id.to_string());
    }

    /// Make `reference_id` a container holding `items`.
    pub fn set_contents(&self, reference_id: &str, rows: usize, cols: usize, items: Vec<CellRecord>) {
        self.contents.lock().insert(reference_id.to_string(), ContainerContents { rows, cols, items });
    }

    /// Records `auto_populate` places, in order, into free slots.
    pub fn set_population(&self, records: Vec<CellRecord>) {
        *self.population.lock() = records;
    }

    pub fn set_updates(&self) -> Vec<(usize, SlotKey)> {
        self.set_updates.lock().clone()
    }

    pub fn used(&self) -> Vec<String> {
        self.used.lock().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

impl SystemAdapter for ScriptedAdapter {
    fn is_container_reference(&self, record: &CellRecord) -> bool {
        self.contents.lock().contains_key(&record.reference_id)
    }

    fn container_contents(&self, record: &CellRecord, _owner: &OwnerHandle) -> Option<ContainerContents> {
        self.contents.lock().get(&record.reference_id).cloned()
    }

    fn on_exclusive_set_cell_updated(&self, set_index: usize, slot_key: SlotKey) {
        self.log.lock().push(format!("hook {}:{}", set_index, slot_key));
        self.set_updates.lock().push((set_index, slot_key));
    }

    fn is_slot_locked(&self, container: &ResolvedContainer, slot_key: SlotKey) -> bool {
        self.locked.lock().contains(&(container.kind, container.index, slot_key))
    }

    fn is_blocked(&self, doc: &Document) -> bool {
        self.blocked.lock().contains(&doc.reference_id)
    }

    fn use_item(&self, record: &CellRecord, _owner: &OwnerHandle) {
        self.used.lock().push(record.reference_id.clone());
    }

    fn execute_macro(&self, record: &CellRecord, _owner: &OwnerHandle) {
        self.executed.lock().push(record.reference_id.clone());
    }

    fn auto_populate(&self, grid: &ContainerGrid, _owner: &OwnerHandle) -> ContainerItems {
        let mut filled = grid.clone();
        for record in self.population.lock().iter() {
            if let Some(key) = filled.first_free_slot() {
                filled.set(key, Some(record.clone()));
            }
        }
        filled.items
    }
}

/// A coordinator over a fresh store bound to entity `hero`, with every
/// collaborator scripted.
pub struct CoordinatorHarness {
    pub backend: Arc<FailingBackend>,
    pub store: Arc<PersistenceManager>,
    pub documents: Arc<ScriptedDocuments>,
    pub adapter: Arc<ScriptedAdapter>,
    pub notifier: Arc<RecordingNotifier>,
    pub renderer: Arc<RecordingRenderer>,
    pub coordinator: InteractionCoordinator,
    log: OpLog,
}

impl CoordinatorHarness {
    pub fn new() -> Self {
        Self::with_owner(OwnerHandle::entity("hero"))
    }

    pub fn with_owner(owner: OwnerHandle) -> Self {
        let log: OpLog = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(FailingBackend::with_log(log.clone()));
        let store = Arc::new(PersistenceManager::new(backend.clone(), StoreOptions::default()));
        store.bind_owner(owner.clone());
        let documents = Arc::new(ScriptedDocuments::new(owner));
        let adapter = Arc::new(ScriptedAdapter::new(log.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let renderer = Arc::new(RecordingRenderer::new(log.clone()));
        let coordinator = InteractionCoordinator::new(store.clone(), documents.clone(), adapter.clone())
            .with_notifier(notifier.clone())
            .with_renderer(renderer.clone());
        Self { backend, store, documents, adapter, notifier, renderer, coordinator, log }
    }

    pub fn op_log(&self) -> OpLog {
        self.log.clone()
    }

    /// Snapshot of the operation log.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Drop an external document onto `cell`.
    ///
    /// Panics if the store fails; harness backends only fail on request.
    pub fn drop_document(&mut self, cell: &CellContext, reference_id: &str) -> DropOutcome {
        let payload = DragPayload::Document { reference_id: reference_id.to_string() };
        match self.coordinator.handle_drop(cell, &payload) {
            Ok(outcome) => outcome,
            Err(e) => panic!("drop of {} failed: {}", reference_id, e),
        }
    }

    /// Drag `from` onto `to`.
    pub fn drag(&mut self, from: &CellContext, to: &CellContext) -> Result<DropOutcome, StoreError> {
        if !self.coordinator.handle_drag_start(from)? {
            return Ok(DropOutcome::NoChange);
        }
        self.coordinator.handle_drop(to, &DragPayload::Slot { slot_key: from.slot_key })
    }
}

impl Default for CoordinatorHarness {
    fn default() -> Self {
        Self::new()
    }
}
