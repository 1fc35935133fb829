//! Content-addressed release manifests
//!
//! A manifest maps every regular file below a release root to the SHA-256 of
//! its contents. Keys are relative paths joined with `/`; directories are not
//! represented. Manifests are cached per version (see [`cache`]).

mod cache;

pub use cache::{get_or_build_manifest, ManifestCache, SideFileManifestCache, MANIFEST_EXTENSION};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Path is not within release root: {0}")]
    PathNotInRoot(PathBuf),

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("Manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}

/// Relative path → hex SHA-256 for one version's tree.
///
/// Backed by a sorted map, so serialization is deterministic regardless of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileManifest {
    entries: BTreeMap<String, String>,
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a digest, returning the previous one for the path if any.
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) -> Option<String> {
        self.entries.insert(path.into(), digest.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl FromIterator<(String, String)> for FileManifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Hash every regular file below `root`.
///
/// Symlinks are not followed and are left out of the manifest. Fails if the
/// tree cannot be walked or any file cannot be read.
pub fn build_manifest(root: &Path) -> Result<FileManifest, ManifestError> {
    let metadata = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if !metadata.is_dir() {
        return Err(io_err(
            root,
            io::Error::new(io::ErrorKind::InvalidInput, "release root is not a directory"),
        ));
    }

    let mut manifest = FileManifest::new();
    let mut total_bytes = 0u64;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ManifestError::PathNotInRoot(entry.path().to_path_buf()))?;
        let key = normalize_rel_path(rel_path)?;

        total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        manifest.insert(key, hash_file(entry.path())?);
    }

    tracing::debug!(
        root = %root.display(),
        files = manifest.len(),
        bytes = total_bytes,
        "manifest built"
    );
    Ok(manifest)
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
///
/// An empty file yields the digest of zero bytes, exactly as the hasher
/// produces it.
pub fn hash_file(path: &Path) -> Result<String, ManifestError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Join path components with `/`, rejecting anything but plain names.
pub fn normalize_rel_path(rel_path: &Path) -> Result<String, ManifestError> {
    let mut parts = Vec::new();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| ManifestError::NonUtf8Path(rel_path.to_path_buf()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => return Err(ManifestError::PathNotInRoot(rel_path.to_path_buf())),
        }
    }
    Ok(parts.join("/"))
}
