//! Per-version manifest cache
//!
//! Manifests are immutable once written, so a cached manifest is trusted
//! without re-hashing. Side files live at `<dir>/<version>.hashes` and hold
//! the flat JSON object path → digest.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use upgrade_descriptor::Version;

use super::{build_manifest, io_err, FileManifest, ManifestError};

/// Extension of manifest side files
pub const MANIFEST_EXTENSION: &str = "hashes";

/// Side-channel store for manifests, keyed by version.
pub trait ManifestCache {
    /// Load a cached manifest. `Ok(None)` is a miss.
    fn load(&self, version: &Version) -> Result<Option<FileManifest>, ManifestError>;

    /// Persist a manifest. Callers treat failures as non-fatal.
    fn save(&self, version: &Version, manifest: &FileManifest) -> Result<(), ManifestError>;

    /// Drop the cached manifest for a version whose tree was replaced.
    /// Returns whether an entry existed.
    fn invalidate(&self, _version: &Version) -> Result<bool, ManifestError> {
        Ok(false)
    }
}

/// Manifest cache backed by JSON side files in one directory.
#[derive(Debug, Clone)]
pub struct SideFileManifestCache {
    dir: PathBuf,
}

impl SideFileManifestCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<version>.hashes`
    pub fn path_for(&self, version: &Version) -> PathBuf {
        self.dir.join(format!("{}.{}", version.as_str(), MANIFEST_EXTENSION))
    }
}

impl ManifestCache for SideFileManifestCache {
    fn load(&self, version: &Version) -> Result<Option<FileManifest>, ManifestError> {
        let path = self.path_for(version);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        match FileManifest::from_json(&contents) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                tracing::warn!(
                    version = %version,
                    path = %path.display(),
                    error = %e,
                    "unreadable manifest side file, treating as miss"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, version: &Version, manifest: &FileManifest) -> Result<(), ManifestError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;

        let path = self.path_for(version);
        let json = manifest.to_json()?;
        let tmp = path.with_extension(format!("{}.tmp", MANIFEST_EXTENSION));
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    fn invalidate(&self, version: &Version) -> Result<bool, ManifestError> {
        let path = self.path_for(version);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(path, e)),
        }
    }
}

/// Return the cached manifest for `version`, building it from `root` on a miss.
///
/// Cache failures never fail the call: a load error falls back to hashing,
/// and a save error is logged while the freshly built manifest is returned.
pub fn get_or_build_manifest(
    cache: &dyn ManifestCache,
    version: &Version,
    root: &Path,
) -> Result<FileManifest, ManifestError> {
    match cache.load(version) {
        Ok(Some(manifest)) => {
            tracing::debug!(version = %version, files = manifest.len(), "manifest cache hit");
            return Ok(manifest);
        }
        Ok(None) => {
            tracing::debug!(version = %version, "no cached manifest, hashing release tree");
        }
        Err(e) => {
            tracing::warn!(version = %version, error = %e, "manifest cache load failed, hashing release tree");
        }
    }

    let manifest = build_manifest(root)?;
    if let Err(e) = cache.save(version, &manifest) {
        tracing::warn!(version = %version, error = %e, "failed to cache manifest");
    }
    Ok(manifest)
}
