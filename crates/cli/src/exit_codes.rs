//! CLI Exit Code Registry
//!
//! Single source of truth for `qslot` exit codes. Scripts rely on them.
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success                                  |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args)               |
//! | 3-9     | store     | Durable storage and document codes       |
//! | 10-19   | lookup    | Named thing not present in the document  |

use quickslot_engine::StoreError;

// =============================================================================
// Universal (0-2)
// =============================================================================

pub const EXIT_SUCCESS: u8 = 0;

/// General error. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, unknown backend, malformed slot key.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Store (3-9)
// =============================================================================

/// The backend failed to read, write, or remove a document.
pub const EXIT_STORE_BACKEND: u8 = 3;

/// A stored document is not valid JSON.
pub const EXIT_STORE_CORRUPT: u8 = 4;

/// Filesystem error opening the data directory.
pub const EXIT_STORE_IO: u8 = 5;

// =============================================================================
// Lookup (10-19)
// =============================================================================

/// `find` located no cell holding the reference.
pub const EXIT_REFERENCE_NOT_FOUND: u8 = 10;

/// No view with the given id, or the operation was refused (last view).
pub const EXIT_VIEW_REFUSED: u8 = 11;

/// Index outside the configured container list.
pub const EXIT_OUT_OF_RANGE: u8 = 12;

/// Map a store failure to its exit code.
pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::Backend(_) => EXIT_STORE_BACKEND,
        StoreError::Serialize(_) => EXIT_STORE_CORRUPT,
        StoreError::Io(_) => EXIT_STORE_IO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_have_distinct_codes() {
        let codes = [
            store_exit_code(&StoreError::Backend("x".into())),
            store_exit_code(&StoreError::Serialize("x".into())),
            store_exit_code(&StoreError::Io("x".into())),
        ];
        assert_eq!(codes, [EXIT_STORE_BACKEND, EXIT_STORE_CORRUPT, EXIT_STORE_IO]);
        assert!(codes.iter().all(|c| (3..10).contains(c)));
    }
}
