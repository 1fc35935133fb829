//! Packager configuration
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (packager.toml)
//! 3. Environment variables (PACKAGER_*)
//! 4. CLI flags
//!
//! The merged value is deserialized into [`PackagerConfig`], which is passed
//! explicitly to every component that needs it.

mod defaults;
mod effective;
mod merge;

pub use defaults::{BuiltinDefaults, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, PackageSettings, PackagerConfig};
pub use merge::{deep_merge, env_layer, merge_layers};
