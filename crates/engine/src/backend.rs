//! Durable storage seam.
//!
//! The store persists whole JSON documents under a `StorageKey`. One key per
//! owner holds the unified state document; the legacy per-branch keys only
//! exist on data written before the unified schema and are deleted after
//! migration.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde_json::Value;

use quickslot_core::OwnerHandle;

use crate::error::StoreError;

/// Pre-unification per-branch stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegacyBranch {
    Hotbar,
    WeaponSets,
    QuickAccess,
    ActiveSet,
}

impl LegacyBranch {
    pub const ALL: [LegacyBranch; 4] =
        [LegacyBranch::Hotbar, LegacyBranch::WeaponSets, LegacyBranch::QuickAccess, LegacyBranch::ActiveSet];

    pub fn flag_name(&self) -> &'static str {
        match self {
            LegacyBranch::Hotbar => "hotbar",
            LegacyBranch::WeaponSets => "weaponSets",
            LegacyBranch::QuickAccess => "quickAccess",
            LegacyBranch::ActiveSet => "activeSet",
        }
    }

    pub fn from_flag_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.flag_name() == name)
    }
}

/// Which document under a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentSlot {
    /// The unified, versioned state document.
    State,
    Legacy(LegacyBranch),
}

impl DocumentSlot {
    pub fn flag_name(&self) -> String {
        match self {
            DocumentSlot::State => "state".to_string(),
            DocumentSlot::Legacy(b) => format!("legacy.{}", b.flag_name()),
        }
    }

    pub fn from_flag_name(name: &str) -> Option<Self> {
        if name == "state" {
            return Some(DocumentSlot::State);
        }
        name.strip_prefix("legacy.")
            .and_then(LegacyBranch::from_flag_name)
            .map(DocumentSlot::Legacy)
    }
}

/// Address of one persisted document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub owner: OwnerHandle,
    pub slot: DocumentSlot,
}

impl StorageKey {
    pub fn state(owner: &OwnerHandle) -> Self {
        Self { owner: owner.clone(), slot: DocumentSlot::State }
    }

    pub fn legacy(owner: &OwnerHandle, branch: LegacyBranch) -> Self {
        Self { owner: owner.clone(), slot: DocumentSlot::Legacy(branch) }
    }

    /// `"global"` or `"entity:<id>"`.
    pub fn scope_name(&self) -> String {
        self.owner.to_string()
    }

    /// Inverse of (`scope_name`, `slot.flag_name`).
    pub fn parse(scope: &str, slot: &str) -> Option<Self> {
        let owner = if scope == "global" {
            OwnerHandle::Global
        } else {
            OwnerHandle::Entity(scope.strip_prefix("entity:")?.to_string())
        };
        Some(Self { owner, slot: DocumentSlot::from_flag_name(slot)? })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope_name(), self.slot.flag_name())
    }
}

/// A durable document store.
///
/// Implementations must be safe to share across threads; the state store
/// serializes writes itself, so backends need no write ordering of their own.
pub trait DocumentBackend: Send + Sync {
    fn read(&self, key: &StorageKey) -> Result<Option<Value>, StoreError>;
    fn write(&self, key: &StorageKey, doc: &Value) -> Result<(), StoreError>;
    fn remove(&self, key: &StorageKey) -> Result<(), StoreError>;
    /// Every stored key.
    fn keys(&self) -> Result<Vec<StorageKey>, StoreError>;
}

/// In-process backend. Used by tests and by hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<StorageKey, Value>>,
    writes: Mutex<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a write.
    pub fn insert(&self, key: StorageKey, doc: Value) {
        self.docs.lock().insert(key, doc);
    }

    pub fn get(&self, key: &StorageKey) -> Option<Value> {
        self.docs.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.docs.lock().contains_key(key)
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl DocumentBackend for MemoryBackend {
    fn read(&self, key: &StorageKey) -> Result<Option<Value>, StoreError> {
        Ok(self.docs.lock().get(key).cloned())
    }

    fn write(&self, key: &StorageKey, doc: &Value) -> Result<(), StoreError> {
        self.docs.lock().insert(key.clone(), doc.clone());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.docs.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        Ok(self.docs.lock().keys().cloned().collect())
    }
}
