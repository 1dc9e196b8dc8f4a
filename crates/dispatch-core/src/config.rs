//! Filesystem layout for Dispatch.
//!
//! All application data lives under one state directory:
//!
//! ```text
//! ~/.dispatch/
//! ├── config/       # dispatch.yaml, .env.local
//! ├── metrics/      # persisted request metrics
//! └── logs/
//! ```
//!
//! # Environment Variables
//!
//! - `DISPATCH_STATE_DIR`: Override the base state directory
//! - `DISPATCH_CONFIG_DIR`: Override the config directory
//! - `DISPATCH_METRICS_DIR`: Override the metrics directory

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "DISPATCH_STATE_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "DISPATCH_CONFIG_DIR";

/// Environment variable for custom metrics directory.
pub const METRICS_DIR_ENV: &str = "DISPATCH_METRICS_DIR";

const DEFAULT_STATE_DIR: &str = ".dispatch";

const CONFIG_SUBDIR: &str = "config";
const METRICS_SUBDIR: &str = "metrics";
const LOGS_SUBDIR: &str = "logs";

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "dispatch.yaml";

/// Get the default state directory.
///
/// Determined by:
/// 1. `DISPATCH_STATE_DIR` if set
/// 2. `~/.dispatch` if a home directory is available
/// 3. `.dispatch` in the current directory
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Resolved directory layout rooted at a state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    config_dir: PathBuf,
    metrics_dir: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`, honouring the per-directory env overrides.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join(CONFIG_SUBDIR));
        let metrics_dir = std::env::var(METRICS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join(METRICS_SUBDIR));

        Self {
            root,
            config_dir,
            metrics_dir,
        }
    }

    /// Layout rooted at `root` with no env overrides.
    pub fn fixed(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join(CONFIG_SUBDIR),
            metrics_dir: root.join(METRICS_SUBDIR),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_SUBDIR)
    }

    /// The YAML settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Environment file for secrets (API keys).
    pub fn env_file(&self) -> PathBuf {
        self.config_dir.join(".env.local")
    }

    /// Create every directory of the layout.
    pub fn ensure_all(&self) -> Result<()> {
        for dir in [self.config_dir.clone(), self.metrics_dir.clone(), self.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Load `.env.local` from the config directory, then from the working
    /// directory. Missing files are ignored; existing env vars win.
    pub fn load_env(&self) {
        for file in [self.env_file(), PathBuf::from(".env.local")] {
            if dotenvy::from_path(&file).is_ok() {
                debug!(path = %file.display(), "loaded environment file");
            }
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(state_dir())
    }
}
