// SQLite backend: every document in one database file

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use quickslot_engine::backend::{DocumentBackend, StorageKey};
use quickslot_engine::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    scope TEXT NOT NULL,          -- "global" or "entity:<id>"
    slot TEXT NOT NULL,           -- "state" or "legacy.<branch>"
    body TEXT NOT NULL,           -- JSON document
    updated_at TEXT NOT NULL,     -- RFC 3339, UTC
    PRIMARY KEY (scope, slot)
);
"#;

fn backend_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(backend_err)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// When `key` was last written.
    pub fn updated_at(&self, key: &StorageKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM documents WHERE scope = ?1 AND slot = ?2",
                params![key.scope_name(), key.slot.flag_name()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend_err)?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}

impl DocumentBackend for SqliteBackend {
    fn read(&self, key: &StorageKey) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE scope = ?1 AND slot = ?2",
                params![key.scope_name(), key.slot.flag_name()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend_err)?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &StorageKey, doc: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (scope, slot, body, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, slot) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![key.scope_name(), key.slot.flag_name(), body, Utc::now().to_rfc3339()],
        )
        .map_err(backend_err)?;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM documents WHERE scope = ?1 AND slot = ?2",
            params![key.scope_name(), key.slot.flag_name()],
        )
        .map_err(backend_err)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT scope, slot FROM documents ORDER BY scope, slot")
            .map_err(backend_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(backend_err)?;

        let mut keys = Vec::new();
        for row in rows {
            let (scope, slot) = row.map_err(backend_err)?;
            match StorageKey::parse(&scope, &slot) {
                Some(key) => keys.push(key),
                None => log::warn!("[Store] Ignoring unknown document {}/{}", scope, slot),
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickslot_core::OwnerHandle;
    use quickslot_engine::backend::LegacyBranch;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn test_upsert_and_read_back() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let key = StorageKey::state(&OwnerHandle::entity("hero"));

        backend.write(&key, &json!({"revision": 1})).unwrap();
        backend.write(&key, &json!({"revision": 2})).unwrap();
        assert_eq!(backend.read(&key).unwrap(), Some(json!({"revision": 2})));
        assert!(backend.updated_at(&key).unwrap().is_some());
        assert_eq!(backend.keys().unwrap(), vec![key.clone()]);

        backend.remove(&key).unwrap();
        assert_eq!(backend.read(&key).unwrap(), None);
        assert_eq!(backend.updated_at(&key).unwrap(), None);
    }

    #[test]
    fn test_documents_survive_reopen() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let path = temp_file.path();
        let owner = OwnerHandle::entity("hero");
        {
            let backend = SqliteBackend::open(path).unwrap();
            backend.write(&StorageKey::legacy(&owner, LegacyBranch::Hotbar), &json!({"grids": []})).unwrap();
            backend.write(&StorageKey::state(&OwnerHandle::Global), &json!({"version": 2})).unwrap();
        }

        let reopened = SqliteBackend::open(path).unwrap();
        let keys = reopened.keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            reopened.read(&StorageKey::legacy(&owner, LegacyBranch::Hotbar)).unwrap(),
            Some(json!({"grids": []}))
        );
    }

    #[test]
    fn test_unknown_rows_are_skipped() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .conn
            .lock()
            .execute(
                "INSERT INTO documents (scope, slot, body, updated_at) VALUES ('elsewhere', 'state', '{}', '')",
                [],
            )
            .unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }
}
