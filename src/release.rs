//! Release ingestion
//!
//! A release arrives as an extracted directory tree. Its version is read from
//! the build metadata file inside the tree, then the tree is moved into the
//! release directory under that version.

use regex_lite::Regex;
use serde::Deserialize;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use upgrade_descriptor::{DescriptorError, Version};

/// Errors for release handling
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid build metadata {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Build metadata {0} has no usable changelist")]
    MissingChangelist(PathBuf),

    #[error("Path is not within release tree: {0}")]
    PathNotInTree(PathBuf),

    #[error("No version found for release {0}")]
    VersionNotFound(String),

    #[error(transparent)]
    Version(#[from] DescriptorError),
}

fn io_err(path: impl Into<PathBuf>, source: io::Error) -> ReleaseError {
    ReleaseError::Io {
        path: path.into(),
        source,
    }
}

/// The parts of the build metadata (`.modules`) file we read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildMetadata {
    #[serde(default)]
    pub changelist: Option<u64>,
    #[serde(default)]
    pub compatible_changelist: Option<u64>,
    #[serde(default)]
    pub build_id: Option<String>,
}

/// Read the release version from `<tree>/<metadata_rel_path>`.
pub fn resolve_version(tree: &Path, metadata_rel_path: &str) -> Result<Version, ReleaseError> {
    let path = tree.join(metadata_rel_path);
    let contents = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let metadata: BuildMetadata =
        serde_json::from_str(&contents).map_err(|source| ReleaseError::Metadata {
            path: path.clone(),
            source,
        })?;

    match metadata.changelist {
        Some(changelist) if changelist > 0 => Ok(Version::parse(&changelist.to_string())?),
        _ => Err(ReleaseError::MissingChangelist(path)),
    }
}

/// Guess a version from a download or archive name.
///
/// Picks the longest run of at least five digits; the first one wins a tie.
pub fn version_from_file_name(name: &str) -> Option<Version> {
    let re = Regex::new(r"\d{5,}").ok()?;
    let mut best: Option<&str> = None;
    for m in re.find_iter(name) {
        if best.map_or(true, |b| m.as_str().len() > b.len()) {
            best = Some(m.as_str());
        }
    }
    best.and_then(|digits| Version::parse(digits).ok())
}

/// Resolve the version from metadata, falling back to `name_hint`.
pub fn resolve_version_or_hint(
    tree: &Path,
    metadata_rel_path: &str,
    name_hint: Option<&str>,
) -> Result<Version, ReleaseError> {
    match resolve_version(tree, metadata_rel_path) {
        Ok(version) => Ok(version),
        Err(e) => {
            let Some(hint) = name_hint else {
                return Err(e);
            };
            tracing::warn!(error = %e, hint, "build metadata unusable, trying release name");
            version_from_file_name(hint).ok_or_else(|| ReleaseError::VersionNotFound(hint.to_string()))
        }
    }
}

/// Move `tree` to `<release_dir>/<version>`, replacing an existing copy.
///
/// Falls back to a recursive copy when the rename crosses file systems.
pub fn ingest_release(
    tree: &Path,
    release_dir: &Path,
    version: &Version,
) -> Result<PathBuf, ReleaseError> {
    fs::create_dir_all(release_dir).map_err(|e| io_err(release_dir, e))?;
    let dest = release_dir.join(version.as_str());

    match fs::remove_dir_all(&dest) {
        Ok(()) => tracing::info!(version = %version, "replacing existing release tree"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&dest, e)),
    }

    if let Err(e) = fs::rename(tree, &dest) {
        tracing::debug!(error = %e, "rename failed, copying release tree");
        copy_tree(tree, &dest)?;
        fs::remove_dir_all(tree).map_err(|e| io_err(tree, e))?;
    }

    tracing::info!(version = %version, path = %dest.display(), "release ingested");
    Ok(dest)
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), ReleaseError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| ReleaseError::PathNotInTree(entry.path().to_path_buf()))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| io_err(entry.path(), e))?;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const METADATA: &str = "Binaries/Linux/Game.modules";

    fn write_metadata(root: &Path, json: &str) {
        let path = root.join(METADATA);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    #[test]
    fn test_resolve_version_reads_changelist() {
        let dir = TempDir::new().unwrap();
        write_metadata(
            dir.path(),
            r#"{"Changelist": 3395761, "CompatibleChangelist": 3301923, "BuildId": "abc", "Modules": {}}"#,
        );

        let version = resolve_version(dir.path(), METADATA).unwrap();
        assert_eq!(version.as_str(), "3395761");
    }

    #[test]
    fn test_resolve_version_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_version(dir.path(), METADATA),
            Err(ReleaseError::Io { .. })
        ));

        write_metadata(dir.path(), "not json");
        assert!(matches!(
            resolve_version(dir.path(), METADATA),
            Err(ReleaseError::Metadata { .. })
        ));

        write_metadata(dir.path(), r#"{"BuildId": "abc"}"#);
        assert!(matches!(
            resolve_version(dir.path(), METADATA),
            Err(ReleaseError::MissingChangelist(_))
        ));
    }

    #[test]
    fn test_version_from_file_name() {
        assert_eq!(
            version_from_file_name("UnrealTournament-Client-XAN-3395761-Linux.zip")
                .unwrap()
                .as_str(),
            "3395761"
        );
        assert_eq!(
            version_from_file_name("build-12345-v3301923.zip").unwrap().as_str(),
            "3301923"
        );
        assert!(version_from_file_name("release-1234.zip").is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_hint() {
        let dir = TempDir::new().unwrap();
        let version =
            resolve_version_or_hint(dir.path(), METADATA, Some("client-3395761.zip")).unwrap();
        assert_eq!(version.as_str(), "3395761");

        assert!(matches!(
            resolve_version_or_hint(dir.path(), METADATA, Some("client.zip")),
            Err(ReleaseError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_ingest_replaces_existing() {
        let scratch = TempDir::new().unwrap();
        let releases = TempDir::new().unwrap();
        let version = Version::parse("42").unwrap();

        fs::create_dir_all(releases.path().join("42")).unwrap();
        fs::write(releases.path().join("42/stale.txt"), "old").unwrap();

        let tree = scratch.path().join("extracted");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("sub/new.txt"), "new").unwrap();

        let root = ingest_release(&tree, releases.path(), &version).unwrap();

        assert_eq!(root, releases.path().join("42"));
        assert!(!tree.exists());
        assert!(!root.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(root.join("sub/new.txt")).unwrap(), "new");
    }

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/c.txt"), "c").unwrap();
        fs::write(src.path().join("top.txt"), "t").unwrap();

        let dest = dst.path().join("copy");
        copy_tree(src.path(), &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a/b/c.txt")).unwrap(), "c");
        assert_eq!(fs::read_to_string(dest.join("top.txt")).unwrap(), "t");
    }
}
