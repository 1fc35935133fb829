//! Release directory version store

use std::fs;
use std::path::PathBuf;

use upgrade_descriptor::Version;

use super::{io_err, StoreError, VersionStore};

/// Versions are the sub-directories of the release directory.
///
/// Plain files (manifest side files, archives) and hidden entries are
/// ignored.
#[derive(Debug, Clone)]
pub struct ReleaseDirVersionStore {
    release_dir: PathBuf,
}

impl ReleaseDirVersionStore {
    pub fn new(release_dir: impl Into<PathBuf>) -> Self {
        Self {
            release_dir: release_dir.into(),
        }
    }

    pub fn release_dir(&self) -> &std::path::Path {
        &self.release_dir
    }
}

impl VersionStore for ReleaseDirVersionStore {
    fn list_known_versions(&self) -> Result<Vec<Version>, StoreError> {
        let entries = fs::read_dir(&self.release_dir).map_err(|e| io_err(&self.release_dir, e))?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.release_dir, e))?;
            let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 release directory");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match Version::parse(&name) {
                Ok(version) => versions.push(version),
                Err(e) => tracing::debug!(name = %name, error = %e, "skipping release directory"),
            }
        }

        versions.sort();
        Ok(versions)
    }

    fn path_for(&self, version: &Version) -> PathBuf {
        self.release_dir.join(version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lists_directories_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        for name in ["10", "9", "3395761", ".staging"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("9.hashes"), "{}").unwrap();

        let store = ReleaseDirVersionStore::new(dir.path());
        let versions: Vec<String> = store
            .list_known_versions()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(versions, vec!["9", "10", "3395761"]);
    }

    #[test]
    fn test_path_for() {
        let store = ReleaseDirVersionStore::new("/srv/releases");
        let version = Version::parse("42").unwrap();
        assert_eq!(store.path_for(&version), PathBuf::from("/srv/releases/42"));
    }

    #[test]
    fn test_missing_release_dir_is_error() {
        let store = ReleaseDirVersionStore::new("/nonexistent/releases");
        assert!(matches!(
            store.list_known_versions(),
            Err(StoreError::Io { .. })
        ));
    }
}
