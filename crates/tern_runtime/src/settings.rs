//! Settings management

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tern_script::ScriptLimits;

/// Runtime settings. Fields missing from the file keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub script: ScriptSettings,
    pub event_loop: EventLoopSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

/// QuickJS limits in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub memory_limit: Option<usize>,
    pub max_stack_size: Option<usize>,
    pub gc_threshold: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopSettings {
    /// Drive the loop once the entry script returns.
    pub run_after_script: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Default for EventLoopSettings {
    fn default() -> Self {
        Self {
            run_after_script: true,
        }
    }
}

impl ScriptSettings {
    pub fn limits(&self) -> ScriptLimits {
        ScriptLimits {
            memory_limit: self.memory_limit,
            max_stack_size: self.max_stack_size,
            gc_threshold: self.gc_threshold,
        }
    }
}

impl Settings {
    /// Read settings from `path`. No path, or a file that does not exist,
    /// gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
