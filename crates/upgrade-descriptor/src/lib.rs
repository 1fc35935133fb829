//! Upgrade Descriptor Types
//!
//! Defines the types a client needs to understand an upgrade package:
//! release versions, per-path delta operations, and the `operations.json`
//! descriptor shipped inside every package archive.

pub mod descriptor;
pub mod error;
pub mod operation;
pub mod version;

pub use descriptor::PackageDescriptor;
pub use error::DescriptorError;
pub use operation::{DeltaOperation, DescriptorOperation};
pub use version::Version;

/// File name of the descriptor inside a package.
pub const DESCRIPTOR_FILE_NAME: &str = "operations.json";

/// Directory inside a package holding the payload files, kept apart from
/// the descriptor so release files can never collide with it.
pub const PAYLOAD_DIR_NAME: &str = "files";

/// Extension of compressed package archives.
pub const ARTIFACT_EXTENSION: &str = "tar.gz";

/// Base name shared by every artifact for a `(from, to)` pair.
pub fn artifact_base_name(from: &Version, to: &Version) -> String {
    format!("{}-{}", from, to)
}

/// File name of the compressed package for a `(from, to)` pair.
pub fn artifact_file_name(from: &Version, to: &Version) -> String {
    format!("{}.{}", artifact_base_name(from, to), ARTIFACT_EXTENSION)
}
