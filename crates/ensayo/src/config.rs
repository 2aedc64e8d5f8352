//! Engine configuration, loaded from YAML.
//!
//! ```yaml
//! concurrency: 4
//! isolation: process
//! memcheck: false
//! collapse_prefix: true
//! extra_rules:
//!   - pattern: "^check_(.*)$"
//!     role: test
//! ```

use crate::classify::RuleConfig;
use crate::result::{EnsayoError, EnsayoResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "ENSAYO_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ensayo.yaml";

/// Where each test runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// A child process per test; crashes are contained
    #[default]
    Process,
    /// A thread per test in this process
    Thread,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum tests in flight; 0 means one per CPU
    pub concurrency: i64,
    /// Isolation mode
    pub isolation: IsolationMode,
    /// Relaunch under a memory checker
    pub memcheck: bool,
    /// Classifier rules appended after the defaults
    pub extra_rules: Vec<RuleConfig>,
    /// Drop the directory prefix shared by every test from node names
    pub collapse_prefix: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            isolation: IsolationMode::Process,
            memcheck: false,
            extra_rules: Vec::new(),
            collapse_prefix: true,
        }
    }
}

impl EngineConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set concurrency
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set isolation mode
    #[must_use]
    pub const fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    /// Enable or disable the memory checker
    #[must_use]
    pub const fn with_memcheck(mut self, memcheck: bool) -> Self {
        self.memcheck = memcheck;
        self
    }

    /// Keep or drop the shared name prefix
    #[must_use]
    pub const fn with_collapse_prefix(mut self, collapse: bool) -> Self {
        self.collapse_prefix = collapse;
        self
    }

    /// Append a classifier rule
    #[must_use]
    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.extra_rules.push(rule);
        self
    }

    /// Parse YAML text
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Config`] on malformed YAML or unknown values.
    pub fn from_yaml(text: &str) -> EnsayoResult<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| EnsayoError::config(e.to_string()))
    }

    /// Load a YAML file
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EnsayoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EnsayoError::config(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&text)
            .map_err(|e| EnsayoError::config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from `$ENSAYO_CONFIG`, else `ensayo.yaml` in `dir`, else defaults.
    ///
    /// A file named by the environment variable must exist.
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Config`] if a config file is found but invalid.
    pub fn discover(env_value: Option<&str>, dir: &Path) -> EnsayoResult<Self> {
        if let Some(path) = env_value.filter(|v| !v.is_empty()) {
            return Self::load(PathBuf::from(path));
        }
        let local = dir.join(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(local);
        }
        Ok(Self::default())
    }
}
