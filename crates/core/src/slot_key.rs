//! Cell keys within a container.
//!
//! A `SlotKey` is the `"col-row"` coordinate of a cell. It is unique within
//! its container and only meaningful together with the container's
//! current `rows × cols`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `"col-row"` coordinate of a cell (both 0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey {
    pub col: usize,
    pub row: usize,
}

impl SlotKey {
    #[inline]
    pub const fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// True if this key addresses a cell inside a `rows × cols` grid.
    #[inline]
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.col < cols && self.row < rows
    }

    /// All keys of a `rows × cols` grid, row-major.
    ///
    /// Row-major order is the "first free slot" order used when placing
    /// items into a grid.
    pub fn all(rows: usize, cols: usize) -> impl Iterator<Item = SlotKey> {
        (0..rows).flat_map(move |row| (0..cols).map(move |col| SlotKey::new(col, row)))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.col, self.row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotKeyError(pub String);

impl fmt::Display for SlotKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid slot key '{}': expected \"col-row\"", self.0)
    }
}

impl std::error::Error for SlotKeyError {}

impl FromStr for SlotKey {
    type Err = SlotKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (col, row) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| SlotKeyError(s.to_string()))?;
        let col = col.parse().map_err(|_| SlotKeyError(s.to_string()))?;
        let row = row.parse().map_err(|_| SlotKeyError(s.to_string()))?;
        Ok(SlotKey { col, row })
    }
}

impl TryFrom<String> for SlotKey {
    type Error = SlotKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> Self {
        key.to_string()
    }
}
