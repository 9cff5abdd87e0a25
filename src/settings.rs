//! Loader settings
//!
//! Settings are read from a TOML file (by default
//! `<config dir>/inrepo-triggers/config.toml`) and every field is optional:
//!
//! ```toml
//! trigger_dir = ".lighthouse"
//! trigger_file_names = ["triggers.yaml", "triggers.yml"]
//! http_timeout_secs = 30
//! trigger_plugin = "trigger"
//! max_reference_depth = 32
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for loading and merging trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Repo-relative directory holding trigger declarations
    pub trigger_dir: String,
    /// File names recognised as trigger files inside `trigger_dir` and its
    /// immediate subdirectories. Glob patterns are allowed.
    pub trigger_file_names: Vec<String>,
    /// Timeout applied to every absolute-URL fetch
    pub http_timeout_secs: u64,
    pub user_agent: String,
    /// Plugin enabled for a repository once it declares any job
    pub trigger_plugin: String,
    /// Upper bound on nested reference depth
    pub max_reference_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger_dir: ".lighthouse".to_string(),
            trigger_file_names: vec!["triggers.yaml".to_string(), "triggers.yml".to_string()],
            http_timeout_secs: 30,
            user_agent: format!("inrepo-triggers/{}", env!("CARGO_PKG_VERSION")),
            trigger_plugin: "trigger".to_string(),
            max_reference_depth: 32,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Location of the per-user settings file, if a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("inrepo-triggers").join("config.toml"))
    }

    /// Load from `path`, or from [`Settings::default_path`] when it exists,
    /// falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.is_file() => Self::from_file(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Reject settings the loader cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::Settings {
                message: message.to_string(),
            })
        };
        if self.trigger_dir.trim_matches('/').is_empty() {
            return invalid("trigger_dir must not be empty");
        }
        if self
            .trigger_dir
            .split('/')
            .any(|segment| segment == ".." || segment.contains('\\'))
        {
            return invalid("trigger_dir must stay inside the repository");
        }
        if self.trigger_file_names.is_empty() {
            return invalid("trigger_file_names must list at least one name");
        }
        for name in &self.trigger_file_names {
            if name.contains('/') {
                return invalid("trigger_file_names must be bare file names");
            }
            glob::Pattern::new(name).map_err(|e| Error::Settings {
                message: format!("invalid trigger file pattern '{}': {}", name, e),
            })?;
        }
        if self.http_timeout_secs == 0 {
            return invalid("http_timeout_secs must be greater than zero");
        }
        if self.max_reference_depth == 0 {
            return invalid("max_reference_depth must be greater than zero");
        }
        Ok(())
    }

    /// Whether `file_name` is one of the recognised trigger file names.
    pub fn is_trigger_file(&self, file_name: &str) -> bool {
        self.trigger_file_names.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(file_name))
                .unwrap_or(false)
        })
    }
}
