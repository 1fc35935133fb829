//! Client-side package application
//!
//! Reconstructs the target tree from a source tree and a package: payload
//! files are copied in, removed paths deleted, deferred paths reported for a
//! separate full download.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ulid::Ulid;
use upgrade_descriptor::{
    DescriptorOperation, PackageDescriptor, DESCRIPTOR_FILE_NAME, PAYLOAD_DIR_NAME,
};

use super::{copy_preserving_permissions, extract_archive, io_err, unsafe_path, PackageError};

/// Result of applying a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Payload files written into the target
    pub copied: usize,
    /// Paths deleted from the target
    pub removed: usize,
    /// Paths the client must fetch in full
    pub deferred: Vec<String>,
}

/// Removes a staging directory when dropped.
struct StagingDir(PathBuf);

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Apply a package (an extracted directory or a `.tar.gz`) to `target_root`.
///
/// Removing a path that is already absent is not an error. Deferred files
/// are left untouched.
pub fn apply_package(package: &Path, target_root: &Path) -> Result<ApplySummary, PackageError> {
    let metadata = fs::metadata(package).map_err(|e| io_err(package, e))?;

    let _staging;
    let package_dir = if metadata.is_dir() {
        package.to_path_buf()
    } else {
        let dir = std::env::temp_dir().join(format!("upgrade-apply-{}", Ulid::new()));
        _staging = StagingDir(dir.clone());
        extract_archive(package, &dir)?;
        dir
    };

    let descriptor = PackageDescriptor::from_file(&package_dir.join(DESCRIPTOR_FILE_NAME))?;
    descriptor.validate_paths().map_err(unsafe_path)?;

    fs::create_dir_all(target_root).map_err(|e| io_err(target_root, e))?;

    let mut summary = ApplySummary::default();
    for (path, op) in descriptor.iter() {
        match op {
            DescriptorOperation::Added | DescriptorOperation::Modified => {
                let payload = package_dir.join(PAYLOAD_DIR_NAME).join(path);
                if !payload.is_file() {
                    return Err(PackageError::MissingPayload(path.to_string()));
                }
                copy_preserving_permissions(&payload, &target_root.join(path))?;
                summary.copied += 1;
            }
            DescriptorOperation::Removed => {
                let target = target_root.join(path);
                match fs::remove_file(&target) {
                    Ok(()) => summary.removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        tracing::debug!(path, "removed path already absent");
                    }
                    Err(e) => return Err(io_err(target, e)),
                }
            }
            DescriptorOperation::ModifiedDeferred => {
                summary.deferred.push(path.to_string());
            }
        }
    }

    tracing::info!(
        root = %target_root.display(),
        copied = summary.copied,
        removed = summary.removed,
        deferred = summary.deferred.len(),
        "package applied"
    );
    Ok(summary)
}
