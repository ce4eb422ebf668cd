use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle of the entity whose hotbar is being edited.
///
/// `Global` is the alternate hotbar used when no entity is selected; it is
/// stored under a global, non-owner-scoped key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum OwnerHandle {
    Entity(String),
    Global,
}

impl OwnerHandle {
    pub fn entity(id: impl Into<String>) -> Self {
        OwnerHandle::Entity(id.into())
    }

    /// Entity id, or `None` for the global hotbar.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            OwnerHandle::Entity(id) => Some(id),
            OwnerHandle::Global => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, OwnerHandle::Global)
    }
}

impl Default for OwnerHandle {
    fn default() -> Self {
        OwnerHandle::Global
    }
}

impl fmt::Display for OwnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerHandle::Entity(id) => write!(f, "entity:{}", id),
            OwnerHandle::Global => f.write_str("global"),
        }
    }
}
