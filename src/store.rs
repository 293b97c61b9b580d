//! Local key-value persistence for the two settings slots.
//!
//! The store is one JSON object on disk:
//!
//! ```json
//! { "gemini_api_key": "…", "note_ai_config": { "prompt": "…", "model": "…", "maxTokens": 2000 } }
//! ```
//!
//! It is read once when a session starts. Writes replace the whole file
//! through a temporary file in the same directory and a rename.

use crate::config::RefinementConfig;
use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of the settings file. Missing slots are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_ai_config: Option<RefinementConfig>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/tfda-review/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tfda-review").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read both slots; a missing file is an empty store.
    pub fn load(&self) -> Result<Settings, ReviewError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}", self.path.display());
                return Ok(Settings::default());
            }
            Err(e) => return Err(self.error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&raw).map_err(|e| self.error(e))
    }

    /// Overwrite the credential slot; an empty string clears it.
    pub fn save_credential(&self, credential: &str) -> Result<(), ReviewError> {
        let mut settings = self.load()?;
        settings.gemini_api_key = (!credential.is_empty()).then(|| credential.to_string());
        self.write(&settings)?;
        info!("Saved API key to {}", self.path.display());
        Ok(())
    }

    pub fn save_refinement(&self, config: &RefinementConfig) -> Result<(), ReviewError> {
        let mut settings = self.load()?;
        settings.note_ai_config = Some(config.clone());
        self.write(&settings)?;
        info!("Saved notes refinement settings to {}", self.path.display());
        Ok(())
    }

    fn write(&self, settings: &Settings) -> Result<(), ReviewError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.error(e))?;

        let json = serde_json::to_vec_pretty(settings).map_err(|e| self.error(e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.error(e))?;
        tmp.write_all(&json).map_err(|e| self.error(e))?;
        tmp.flush().map_err(|e| self.error(e))?;
        tmp.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }

    fn error(&self, e: impl std::fmt::Display) -> ReviewError {
        ReviewError::Settings {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }
}
