//! Optional TOML settings file.
//!
//! ```toml
//! [autosave]
//! enabled = true
//! delay_ms = 250
//!
//! [scheduler]
//! idle_timeout_ms = 5000
//! thread_name = "ledger-autosave"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ledger_persistence::{AutosaveConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub autosave: AutosaveConfig,
    pub scheduler: SchedulerConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read settings file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parse settings file {}", path.display()))
    }

    /// Defaults when no file is given.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
