//! `quickslot-core`: addressing types shared by the store, the interaction
//! coordinator, and the storage backends.
//!
//! Pure data. No I/O, no engine logic.

pub mod location;
pub mod owner;
pub mod slot_key;

pub use location::{CellLocation, CellPath, ContainerKind, ContainerRef};
pub use owner::OwnerHandle;
pub use slot_key::{SlotKey, SlotKeyError};
