//! Configuration for quickslot.
//!
//! Settings live in a single JSON file with dotted keys, under the user's
//! config directory. Missing keys fall back to defaults.

pub mod settings;

pub use settings::Settings;
