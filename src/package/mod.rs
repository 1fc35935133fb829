//! Upgrade package assembly
//!
//! Materializes a working directory holding only the changed payload of a
//! delta (under `files/`) plus its `operations.json` descriptor, then
//! compresses it into `<from>-<to>.tar.gz`.

mod apply;
mod archive;
mod defer;

pub use apply::{apply_package, ApplySummary};
pub use archive::{extract_archive, write_archive};
pub use defer::{DeferPolicy, DEFAULT_DEFERRED_PATTERNS};

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use upgrade_descriptor::{
    artifact_base_name, artifact_file_name, DeltaOperation, DescriptorError, DescriptorOperation,
    PackageDescriptor, Version, DESCRIPTOR_FILE_NAME, PAYLOAD_DIR_NAME,
};

use crate::delta::DeltaOperationSet;

/// Errors for package operations
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Deferred pattern error: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Path is not within package: {0}")]
    PathNotInPackage(PathBuf),

    #[error("Unsafe path in descriptor: {0}")]
    UnsafePath(String),

    #[error("Payload file missing from package: {0}")]
    MissingPayload(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> PackageError {
    PackageError::Io {
        path: path.into(),
        source,
    }
}

/// What an assembly produced, for logging and reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOutcome {
    /// Files copied into the payload
    pub file_count: usize,
    /// Total size of copied files
    pub byte_count: u64,
    /// Added or modified files left out by the defer policy
    pub deferred_count: usize,
    /// Paths the client deletes
    pub removed_count: usize,
    /// Fingerprint of the delta, see [`DeltaOperationSet::fingerprint`]
    pub fingerprint: String,
    /// The descriptor written into the package
    pub descriptor: PackageDescriptor,
}

/// A finished, compressed package still inside the working directory.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    pub outcome: AssembleOutcome,
}

/// Copies changed payload into a package directory.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    policy: DeferPolicy,
}

impl Assembler {
    pub fn new(policy: DeferPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DeferPolicy {
        &self.policy
    }

    /// The descriptor for a delta under this assembler's defer policy.
    pub fn descriptor_for(&self, delta: &DeltaOperationSet) -> PackageDescriptor {
        delta
            .iter()
            .map(|(path, op)| {
                let recorded = if op.carries_payload() && self.policy.is_deferred(path) {
                    DescriptorOperation::ModifiedDeferred
                } else {
                    DescriptorOperation::from(op)
                };
                (path.to_string(), recorded)
            })
            .collect()
    }

    /// Populate `working_dir` with the payload and descriptor for `delta`.
    ///
    /// Any previous content of `working_dir` is removed first. Added and
    /// modified files are copied from `source_root` into `files/` with their
    /// permission bits; deferred and removed paths are recorded in the descriptor only.
    pub fn assemble(
        &self,
        delta: &DeltaOperationSet,
        source_root: &Path,
        working_dir: &Path,
    ) -> Result<AssembleOutcome, PackageError> {
        let descriptor = self.descriptor_for(delta);
        descriptor.validate_paths().map_err(unsafe_path)?;

        match fs::remove_dir_all(working_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(working_dir, e)),
        }
        let payload_dir = working_dir.join(PAYLOAD_DIR_NAME);
        fs::create_dir_all(&payload_dir).map_err(|e| io_err(&payload_dir, e))?;

        let mut outcome = AssembleOutcome {
            file_count: 0,
            byte_count: 0,
            deferred_count: 0,
            removed_count: 0,
            fingerprint: delta.fingerprint(),
            descriptor: PackageDescriptor::new(),
        };

        for (path, op) in descriptor.iter() {
            match op {
                DescriptorOperation::Added | DescriptorOperation::Modified => {
                    let bytes = copy_preserving_permissions(
                        &source_root.join(path),
                        &payload_dir.join(path),
                    )?;
                    outcome.file_count += 1;
                    outcome.byte_count += bytes;
                }
                DescriptorOperation::ModifiedDeferred => {
                    tracing::debug!(path, "deferred file changed, left out of payload");
                    outcome.deferred_count += 1;
                }
                DescriptorOperation::Removed => {
                    tracing::debug!(path, "file removed");
                    outcome.removed_count += 1;
                }
            }
        }

        descriptor.write_to_file(&working_dir.join(DESCRIPTOR_FILE_NAME))?;
        outcome.descriptor = descriptor;
        Ok(outcome)
    }
}

/// Assemble and compress the package for `(from, to)` under `work_root`.
///
/// The payload directory is `<work_root>/<from>-<to>-package` and the archive
/// `<work_root>/<from>-<to>.tar.gz`. The payload directory is removed once
/// the archive is written.
pub fn build_package(
    assembler: &Assembler,
    delta: &DeltaOperationSet,
    from: &Version,
    to: &Version,
    source_root: &Path,
    work_root: &Path,
) -> Result<BuiltPackage, PackageError> {
    let package_dir = work_root.join(format!("{}-package", artifact_base_name(from, to)));
    let archive_path = work_root.join(artifact_file_name(from, to));

    let outcome = assembler.assemble(delta, source_root, &package_dir)?;
    tracing::info!(
        from = %from,
        to = %to,
        files = outcome.file_count,
        size = %format_megabytes(outcome.byte_count),
        deferred = outcome.deferred_count,
        removed = outcome.removed_count,
        fingerprint = %outcome.fingerprint,
        "upgrade package files created"
    );

    let archive_bytes = write_archive(&package_dir, &archive_path)?;
    tracing::debug!(archive = %archive_path.display(), bytes = archive_bytes, "package compressed");
    fs::remove_dir_all(&package_dir).map_err(|e| io_err(&package_dir, e))?;

    Ok(BuiltPackage {
        archive_path,
        archive_bytes,
        outcome,
    })
}

/// Copy a file, creating parent directories and keeping permission bits.
pub(crate) fn copy_preserving_permissions(source: &Path, dest: &Path) -> Result<u64, PackageError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let permissions = fs::metadata(source)
        .map_err(|e| io_err(source, e))?
        .permissions();
    let bytes = fs::copy(source, dest).map_err(|e| io_err(source, e))?;
    fs::set_permissions(dest, permissions).map_err(|e| io_err(dest, e))?;
    Ok(bytes)
}

pub(crate) fn unsafe_path(err: DescriptorError) -> PackageError {
    match err {
        DescriptorError::UnsafePath(path) => PackageError::UnsafePath(path),
        other => PackageError::Descriptor(other),
    }
}

fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Count of added/modified paths in a delta, deferred or not.
pub fn changed_file_count(delta: &DeltaOperationSet) -> usize {
    delta.count(DeltaOperation::Added) + delta.count(DeltaOperation::Modified)
}
