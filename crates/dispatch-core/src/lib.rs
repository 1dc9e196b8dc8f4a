//! Shared configuration for Dispatch.
//!
//! Resolves the on-disk layout (`~/.dispatch` by default), loads secrets
//! from `.env.local`, and parses router settings from `dispatch.yaml`.

pub mod config;
pub mod error;
pub mod settings;

pub use config::{state_dir, Layout};
pub use error::{ConfigError, Result};
pub use settings::{
    default_capabilities, CapabilitySpec, MergeStrategy, ModelSettings, RouterConfig, Settings,
};
