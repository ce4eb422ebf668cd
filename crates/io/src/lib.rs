// Durable backends for the hotbar state store

pub mod json;
pub mod native;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use quickslot_engine::backend::DocumentBackend;
use quickslot_engine::StoreError;

pub use json::JsonDirBackend;
pub use native::SqliteBackend;

/// SQLite database file name inside the data directory.
pub const SQLITE_FILE: &str = "quickslot.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Json,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "sqlite" | "db" => Ok(BackendKind::Sqlite),
            other => Err(format!("unknown backend '{}' (expected json or sqlite)", other)),
        }
    }
}

/// Open the backend of `kind` rooted at `data_dir`.
pub fn open_backend(kind: BackendKind, data_dir: &Path) -> Result<Arc<dyn DocumentBackend>, StoreError> {
    log::debug!("[Store] Opening {} backend at {}", kind, data_dir.display());
    Ok(match kind {
        BackendKind::Json => Arc::new(JsonDirBackend::open(data_dir)?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(&data_dir.join(SQLITE_FILE))?),
    })
}
