//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Config file looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "packager.toml";

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "PACKAGER_";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Directory holding one extracted tree per version
    pub release_dir: String,

    /// Scratch directory for package assembly, cleared after a clean run
    pub working_dir: String,

    /// Durable destination for finished package archives
    pub package_dir: String,

    /// Upgrade-path record file
    pub store_path: String,

    /// Metadata file, relative to a release root, carrying the changelist
    pub version_metadata: String,

    /// Opaque files diffed only at whole-file granularity
    pub deferred_patterns: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            release_dir: "releases".to_string(),
            working_dir: "work".to_string(),
            package_dir: "packages".to_string(),
            store_path: "upgrade_packages.json".to_string(),
            version_metadata:
                "LinuxNoEditor/UnrealTournament/Binaries/Linux/UE4-Linux-Shippingx86_64-unknown-linux-gnu.modules"
                    .to_string(),
            deferred_patterns: vec!["**/*.pak".to_string()],
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "release_dir": self.release_dir,
            "working_dir": self.working_dir,
            "package_dir": self.package_dir,
            "store_path": self.store_path,
            "version_metadata": self.version_metadata,
            "package": {
                "deferred_patterns": self.deferred_patterns
            }
        })
    }
}
