pub mod adapter;
pub mod backend;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod migration;
pub mod model;
pub mod nested;
pub mod resize;
pub mod resolver;
pub mod store;

pub mod harness;

pub use adapter::{Document, DocumentSource, Notifier, SlotRenderer, SystemAdapter};
pub use backend::{DocumentBackend, MemoryBackend, StorageKey};
pub use coordinator::{ClickOutcome, DragPayload, DropOutcome, InteractionCoordinator, Rejection};
pub use error::StoreError;
pub use events::{ChangeKind, StoreEvent};
pub use model::{CellRecord, ContainerGrid, DefaultLayout, State};
pub use resolver::CellContext;
pub use store::{PersistenceManager, StoreOptions};
