//! Conversion settings and their persistence.
//!
//! Settings are stored as a flat JSON object in the user's config directory
//! and survive between runs. A missing or malformed file never aborts
//! startup — it just yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Immutable configuration for one conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Print a running page number in the page footer, continuous across
    /// chapter boundaries.
    pub page_numbers: bool,
    /// Generate a table of contents from the book's navigation structure.
    pub toc: bool,
    /// Print page numbers next to TOC entries (only meaningful with `toc`).
    pub toc_numbers: bool,
    /// First logical page number assigned to the TOC, or to the first
    /// chapter if the TOC is disabled. Must be >= 1.
    pub toc_start_page: usize,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            page_numbers: true,
            toc: false,
            toc_numbers: false,
            toc_start_page: 1,
        }
    }
}

impl ConversionSettings {
    /// Load settings from `path`, falling back to defaults if the file is
    /// missing or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("ignoring malformed settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Persist settings as pretty-printed flat JSON.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).expect("settings serialize");
        fs::write(path, json)
    }

    /// Clamp out-of-range values a hand-edited file may contain.
    fn sanitized(mut self) -> Self {
        if self.toc_start_page == 0 {
            warn!("toc_start_page must be >= 1; using 1");
            self.toc_start_page = 1;
        }
        self
    }
}

/// Default location of the persisted settings file.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("inkbind").join("settings.json"))
}
