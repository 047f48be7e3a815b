//! Saved-invocation persistence. A small key/value JSON document lets the
//! tool rerun its last sync when invoked without mode arguments. The engine
//! never reads or writes this file.

use eyre::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use vaultsync_core::{SyncConfig, SyncMode};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub mode: String,
    pub src: PathBuf,
    pub dst: PathBuf,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub sha256: bool,
}

impl Settings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            mode: match config.mode {
                SyncMode::Dir => "dir".to_string(),
                SyncMode::File => "file".to_string(),
            },
            src: config.src.clone(),
            dst: config.dst.clone(),
            mirror: config.mirror,
            verbose: config.verbose,
            sha256: matches!(config.hash_mode, vaultsync_core::HashMode::Strong),
        }
    }

    pub fn sync_mode(&self) -> Result<SyncMode> {
        match self.mode.as_str() {
            "dir" => Ok(SyncMode::Dir),
            "file" => Ok(SyncMode::File),
            other => bail!("settings file has unknown mode {other:?}"),
        }
    }

    /// Read saved settings; a missing or malformed file just means "none".
    pub fn load(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(settings) => Some(settings),
            Err(err) => {
                log::warn!("ignoring unreadable {}: {err}", path.display());
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }
}
