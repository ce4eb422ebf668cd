// Application settings
// Loaded from ~/.config/quickslot/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quickslot_engine::model::DefaultLayout;
use quickslot_engine::store::StoreOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Store
    #[serde(rename = "store.echoWindowMs")]
    pub echo_window_ms: u64,

    #[serde(rename = "store.backend")]
    pub backend: String,

    #[serde(rename = "store.dataDir")]
    pub data_dir: Option<PathBuf>,  // None = platform data dir

    // Hotbar
    #[serde(rename = "layout.hotbarGrids")]
    pub hotbar_grids: usize,

    #[serde(rename = "layout.hotbarRows")]
    pub hotbar_rows: usize,

    #[serde(rename = "layout.hotbarCols")]
    pub hotbar_cols: usize,

    // Weapon sets
    #[serde(rename = "layout.weaponSets")]
    pub weapon_sets: usize,

    #[serde(rename = "layout.weaponSetRows")]
    pub weapon_set_rows: usize,

    #[serde(rename = "layout.weaponSetCols")]
    pub weapon_set_cols: usize,

    // Quick access
    #[serde(rename = "layout.quickAccessRows")]
    pub quick_access_rows: usize,

    #[serde(rename = "layout.quickAccessCols")]
    pub quick_access_cols: usize,

    // Bags
    #[serde(rename = "layout.nestedRows")]
    pub nested_rows: usize,

    #[serde(rename = "layout.nestedCols")]
    pub nested_cols: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let layout = DefaultLayout::default();
        Self {
            // Store
            echo_window_ms: 500,
            backend: "json".to_string(),
            data_dir: None,
            // Layout
            hotbar_grids: layout.hotbar_grids,
            hotbar_rows: layout.hotbar_rows,
            hotbar_cols: layout.hotbar_cols,
            weapon_sets: layout.weapon_sets,
            weapon_set_rows: layout.weapon_set_rows,
            weapon_set_cols: layout.weapon_set_cols,
            quick_access_rows: layout.quick_access_rows,
            quick_access_cols: layout.quick_access_cols,
            nested_rows: layout.nested_rows,
            nested_cols: layout.nested_cols,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quickslot");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, writing a commented default
    /// file the first time.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            Self::create_default_file(&path);
            return Self::default();
        }
        Self::load_from(&path)
    }

    /// Load settings from `path`, falling back to defaults on any problem.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                return Self::default();
            }
        };

        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        match serde_json::from_str::<Settings>(&cleaned) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Where documents are stored: the override, or the platform data dir.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("quickslot"),
        }
    }

    pub fn layout(&self) -> DefaultLayout {
        DefaultLayout {
            hotbar_grids: self.hotbar_grids,
            hotbar_rows: self.hotbar_rows,
            hotbar_cols: self.hotbar_cols,
            weapon_sets: self.weapon_sets,
            weapon_set_rows: self.weapon_set_rows,
            weapon_set_cols: self.weapon_set_cols,
            quick_access_rows: self.quick_access_rows,
            quick_access_cols: self.quick_access_cols,
            nested_rows: self.nested_rows,
            nested_cols: self.nested_cols,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            echo_window: Duration::from_millis(self.echo_window_ms),
            layout: self.layout(),
        }
    }

    /// Zero-sized grids are meaningless; bump every dimension to at least 1.
    fn sanitized(mut self) -> Self {
        for dim in [
            &mut self.hotbar_grids,
            &mut self.hotbar_rows,
            &mut self.hotbar_cols,
            &mut self.weapon_sets,
            &mut self.weapon_set_rows,
            &mut self.weapon_set_cols,
            &mut self.quick_access_rows,
            &mut self.quick_access_cols,
            &mut self.nested_rows,
            &mut self.nested_cols,
        ] {
            if *dim == 0 {
                *dim = 1;
            }
        }
        self
    }

    /// Create default settings file with comments
    fn create_default_file(path: &Path) {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Store
    // Backend options: "json" (one file per document), "sqlite"
    "store.echoWindowMs": 500,
    "store.backend": "json",
    "store.dataDir": null,

    // Hotbar grids
    "layout.hotbarGrids": 3,
    "layout.hotbarRows": 1,
    "layout.hotbarCols": 5,

    // Weapon sets (only the active set accepts changes)
    "layout.weaponSets": 3,
    "layout.weaponSetRows": 1,
    "layout.weaponSetCols": 2,

    // Quick access
    "layout.quickAccessRows": 2,
    "layout.quickAccessCols": 3,

    // Bags opened from a slot
    "layout.nestedRows": 4,
    "layout.nestedCols": 4
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
