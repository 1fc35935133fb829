//! Effective packager configuration with provenance
//!
//! Merges every layer, records where each layer came from, and deserializes
//! the result into a typed [`PackagerConfig`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::{env_layer, merge_layers};

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing config layer with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Package assembly settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSettings {
    /// Glob patterns selecting opaque files that never enter the payload
    pub deferred_patterns: Vec<String>,
}

/// Typed configuration passed to every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagerConfig {
    pub release_dir: PathBuf,
    pub working_dir: PathBuf,
    pub package_dir: PathBuf,

    /// Where manifest side files live; defaults to `release_dir`
    #[serde(default)]
    pub manifest_dir: Option<PathBuf>,

    pub store_path: PathBuf,

    /// Public prefix for artifact locators; absolute paths are used when unset
    #[serde(default)]
    pub base_url: Option<String>,

    pub version_metadata: String,

    pub package: PackageSettings,

    /// Layers that produced this configuration, in precedence order
    #[serde(skip)]
    pub sources: Vec<ConfigSource>,
}

impl PackagerConfig {
    /// Build the configuration from all layers.
    ///
    /// `config_path` is skipped when the file does not exist. `env` is
    /// usually `std::env::vars()`.
    pub fn load<I>(
        config_path: Option<&Path>,
        env: I,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(value) = env_layer(env) {
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Env,
                path: None,
                digest: None,
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let mut config: PackagerConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        config.sources = sources;
        config.validate()?;
        Ok(config)
    }

    /// Directory holding manifest side files.
    pub fn manifest_dir(&self) -> &Path {
        self.manifest_dir.as_deref().unwrap_or(&self.release_dir)
    }

    /// Create every directory the packager writes into.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let mut dirs = vec![
            self.release_dir.as_path(),
            self.working_dir.as_path(),
            self.package_dir.as_path(),
            self.manifest_dir(),
        ];
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            fs::create_dir_all(dir)
                .map_err(|e| ConfigError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("release_dir", &self.release_dir),
            ("working_dir", &self.working_dir),
            ("package_dir", &self.package_dir),
            ("store_path", &self.store_path),
        ];
        for (name, path) in required {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", name)));
            }
        }
        if self.working_dir == self.release_dir || self.working_dir == self.package_dir {
            // The working directory is wiped after every clean run.
            return Err(ConfigError::ValidationError(
                "working_dir must differ from release_dir and package_dir".to_string(),
            ));
        }
        if self.version_metadata.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "version_metadata must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_load_defaults_only() {
        let config = PackagerConfig::load(None, no_env(), None).unwrap();

        assert_eq!(config.release_dir, PathBuf::from("releases"));
        assert_eq!(config.manifest_dir(), Path::new("releases"));
        assert_eq!(config.package.deferred_patterns, vec!["**/*.pak"]);
        assert!(config.base_url.is_none());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_file_env_cli_precedence() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "release_dir = \"/data/releases\"").unwrap();
        writeln!(temp, "working_dir = \"/data/work\"").unwrap();
        writeln!(temp, "base_url = \"http://file.example.com\"").unwrap();
        writeln!(temp, "[package]").unwrap();
        writeln!(temp, "deferred_patterns = [\"**/*.pak\", \"**/*.ucas\"]").unwrap();

        let env = vec![
            ("PACKAGER_WORKING_DIR".to_string(), "/tmp/work".to_string()),
            ("PACKAGER_BASE_URL".to_string(), "http://env.example.com".to_string()),
        ];
        let cli = serde_json::json!({"base_url": "http://cli.example.com"});

        let config = PackagerConfig::load(Some(temp.path()), env, Some(cli)).unwrap();

        assert_eq!(config.release_dir, PathBuf::from("/data/releases"));
        assert_eq!(config.working_dir, PathBuf::from("/tmp/work"));
        assert_eq!(config.base_url.as_deref(), Some("http://cli.example.com"));
        assert_eq!(config.package.deferred_patterns, vec!["**/*.pak", "**/*.ucas"]);

        let origins: Vec<_> = config.sources.iter().map(|s| s.origin.clone()).collect();
        assert_eq!(
            origins,
            vec![ConfigOrigin::Builtin, ConfigOrigin::File, ConfigOrigin::Env, ConfigOrigin::Cli]
        );
        assert_eq!(config.sources[1].digest.as_ref().map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_missing_config_file_is_skipped() {
        let config =
            PackagerConfig::load(Some(Path::new("/nonexistent/packager.toml")), no_env(), None)
                .unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "release_dir = ").unwrap();

        let err = PackagerConfig::load(Some(temp.path()), no_env(), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_working_dir_must_not_alias_release_dir() {
        let cli = serde_json::json!({"release_dir": "same", "working_dir": "same"});
        let err = PackagerConfig::load(None, no_env(), Some(cli)).unwrap_err();
        assert!(err.to_string().contains("working_dir"));
    }

    #[test]
    fn test_empty_store_path_rejected() {
        let cli = serde_json::json!({"store_path": ""});
        let err = PackagerConfig::load(None, no_env(), Some(cli)).unwrap_err();
        assert!(err.to_string().contains("store_path"));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let root = TempDir::new().unwrap();
        let cli = serde_json::json!({
            "release_dir": root.path().join("releases"),
            "working_dir": root.path().join("work"),
            "package_dir": root.path().join("packages"),
            "manifest_dir": root.path().join("manifests"),
            "store_path": root.path().join("db/upgrade_packages.json"),
        });
        let config = PackagerConfig::load(None, no_env(), Some(cli)).unwrap();
        config.ensure_dirs().unwrap();

        for dir in ["releases", "work", "packages", "manifests", "db"] {
            assert!(root.path().join(dir).is_dir(), "{dir} should exist");
        }
    }
}
