//! Directory artifact sink

use std::fs;
use std::path::{Path, PathBuf};

use upgrade_descriptor::{artifact_file_name, Version};

use super::{io_err, ArtifactSink, StoreError};

/// Moves finished archives into the package directory.
///
/// The locator is `<base_url>/<file name>` when a base URL is configured,
/// otherwise the archive's final path.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSink {
    package_dir: PathBuf,
    base_url: Option<String>,
}

impl DirectoryArtifactSink {
    pub fn new(package_dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            package_dir: package_dir.into(),
            base_url,
        }
    }

    fn locator(&self, file_name: &str, dest: &Path) -> String {
        match self.base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => {
                format!("{}/{}", base.trim().trim_end_matches('/'), file_name)
            }
            _ => dest.display().to_string(),
        }
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn accept(&self, archive: &Path, from: &Version, to: &Version) -> Result<String, StoreError> {
        fs::create_dir_all(&self.package_dir).map_err(|e| io_err(&self.package_dir, e))?;

        let file_name = artifact_file_name(from, to);
        let dest = self.package_dir.join(&file_name);

        if let Err(rename_err) = fs::rename(archive, &dest) {
            // Crossing file systems: copy, then drop the original.
            tracing::debug!(error = %rename_err, "rename failed, copying archive");
            fs::copy(archive, &dest).map_err(|e| io_err(archive, e))?;
            fs::remove_file(archive).map_err(|e| io_err(archive, e))?;
        }

        Ok(self.locator(&file_name, &dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_accept_moves_archive() {
        let work = TempDir::new().unwrap();
        let packages = TempDir::new().unwrap();
        let archive = work.path().join("1-2.tar.gz");
        fs::write(&archive, "gz").unwrap();

        let sink = DirectoryArtifactSink::new(packages.path(), None);
        let locator = sink.accept(&archive, &v("1"), &v("2")).unwrap();

        let dest = packages.path().join("1-2.tar.gz");
        assert!(!archive.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "gz");
        assert_eq!(locator, dest.display().to_string());
    }

    #[test]
    fn test_locator_uses_base_url() {
        let work = TempDir::new().unwrap();
        let packages = TempDir::new().unwrap();
        let archive = work.path().join("anything.tar.gz");
        fs::write(&archive, "gz").unwrap();

        let sink = DirectoryArtifactSink::new(
            packages.path(),
            Some("http://update.example.com/packages/".to_string()),
        );
        let locator = sink.accept(&archive, &v("3301923"), &v("3395761")).unwrap();

        assert_eq!(
            locator,
            "http://update.example.com/packages/3301923-3395761.tar.gz"
        );
    }

    #[test]
    fn test_missing_archive_is_error() {
        let packages = TempDir::new().unwrap();
        let sink = DirectoryArtifactSink::new(packages.path(), None);
        assert!(sink
            .accept(Path::new("/nonexistent/1-2.tar.gz"), &v("1"), &v("2"))
            .is_err());
    }
}
