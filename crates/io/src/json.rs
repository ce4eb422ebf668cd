// JSON directory backend: one file per document

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use quickslot_engine::backend::{DocumentBackend, StorageKey};
use quickslot_engine::StoreError;

/// Stores each document as `<root>/<scope>/<slot>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
pub struct JsonDirBackend {
    root: PathBuf,
}

impl JsonDirBackend {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(encode_component(&key.scope_name()))
            .join(format!("{}.json", key.slot.flag_name()))
    }
}

impl DocumentBackend for JsonDirBackend {
    fn read(&self, key: &StorageKey) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn write(&self, key: &StorageKey, doc: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("[Store] Wrote {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        let mut keys = Vec::new();
        for scope_dir in fs::read_dir(&self.root)? {
            let scope_dir = scope_dir?;
            if !scope_dir.file_type()?.is_dir() {
                continue;
            }
            let Some(scope) = scope_dir.file_name().to_str().and_then(decode_component) else {
                continue;
            };
            for file in fs::read_dir(scope_dir.path())? {
                let file = file?;
                let name = file.file_name();
                let Some(slot) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                    continue;
                };
                if let Some(key) = StorageKey::parse(&scope, slot) {
                    keys.push(key);
                }
            }
        }
        keys.sort_by_key(|k| k.to_string());
        Ok(keys)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any owner id is a
/// safe directory name on every platform.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_component(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
