//! External collaborators of the packaging core
//!
//! The orchestrator only talks to these traits. File-system implementations
//! are provided so the packager runs without any outside service:
//! - [`ReleaseDirVersionStore`]: one sub-directory per version
//! - [`JsonUpgradePathStore`]: upgrade-path records in a JSON document
//! - [`DirectoryArtifactSink`]: finished archives moved into a directory

mod sink;
mod upgrade_paths;
mod versions;

pub use sink::DirectoryArtifactSink;
pub use upgrade_paths::{JsonUpgradePathStore, UpgradePathFile, SCHEMA_ID, SCHEMA_VERSION};
pub use versions::ReleaseDirVersionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use upgrade_descriptor::Version;

/// Errors from collaborator stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Store JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported store schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Upgrade path {from} -> {to} already recorded")]
    Duplicate { from: Version, to: Version },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// A generated upgrade path. Records are never updated, only retracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradePackage {
    /// Assigned by the store on save
    pub id: u64,
    pub from_version: Version,
    pub to_version: Version,
    /// Where clients download the archive
    pub update_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl UpgradePackage {
    /// A record not yet saved.
    pub fn new(from_version: Version, to_version: Version, update_url: impl Into<String>) -> Self {
        Self {
            id: 0,
            from_version,
            to_version,
            update_url: update_url.into(),
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    pub fn is_pair(&self, from: &Version, to: &Version) -> bool {
        &self.from_version == from && &self.to_version == to
    }
}

/// Source of release trees already on disk.
pub trait VersionStore {
    /// Known versions in ascending order.
    fn list_known_versions(&self) -> Result<Vec<Version>, StoreError>;

    /// Root directory of a version's tree.
    fn path_for(&self, version: &Version) -> PathBuf;
}

/// Persistent record of generated upgrade paths.
pub trait UpgradePathStore {
    /// Whether an active record exists for the pair. `Ok(false)` is the
    /// normal "not yet processed" answer; `Err` is a genuine store failure.
    fn exists(&self, from: &Version, to: &Version) -> Result<bool, StoreError>;

    /// Persist a new record, returning it with its assigned id.
    fn save(&self, package: &UpgradePackage) -> Result<UpgradePackage, StoreError>;

    /// Active records in insertion order.
    fn list(&self) -> Result<Vec<UpgradePackage>, StoreError>;

    /// Soft-delete the active record for a pair. Returns whether one existed.
    fn retract(&self, from: &Version, to: &Version) -> Result<bool, StoreError>;
}

/// Destination for finished archives.
pub trait ArtifactSink {
    /// Take ownership of the archive at `archive` and return its locator.
    fn accept(&self, archive: &Path, from: &Version, to: &Version) -> Result<String, StoreError>;
}
