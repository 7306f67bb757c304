//! Project configuration stored in `compute.toml` at the project root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_TIMEOUT, ExecContext};

pub const CONFIG_FILE: &str = "compute.toml";

/// Project configuration (TOML).
///
/// Edited by humans; missing fields default to values that work for a freshly
/// cloned starter kit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Toolchain registry key, e.g. `assemblyscript`.
    pub language: String,

    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Wall-clock budget for each external command, in seconds.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            language: "assemblyscript".to_string(),
            process: ProcessConfig::default(),
        }
    }
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(anyhow!("language must be a non-empty string"));
        }
        if self.process.timeout_secs == 0 {
            return Err(anyhow!("process.timeout_secs must be > 0"));
        }
        if self.process.output_limit_bytes == 0 {
            return Err(anyhow!("process.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn exec_context(&self) -> ExecContext {
        ExecContext::new(
            Duration::from_secs(self.process.timeout_secs),
            self.process.output_limit_bytes,
        )
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ProjectConfig::default()`.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        let cfg = ProjectConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ProjectConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}
