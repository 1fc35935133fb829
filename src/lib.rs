//! Upgrade Packager - incremental upgrade packages for versioned releases
//!
//! Keeps a lineage of release trees on disk and produces, for every older
//! version, a package holding only the files that changed plus an
//! `operations.json` descriptor telling the client what to do with them.

pub mod config;
pub mod delta;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod package;
pub mod release;
pub mod store;

pub use config::{ConfigError, PackagerConfig};
pub use delta::{compute_delta, DeltaOperationSet};
pub use manifest::{build_manifest, get_or_build_manifest, FileManifest, ManifestCache, ManifestError};
pub use orchestrator::{Orchestrator, OrchestratorError, RunPhase, RunState, UpgradeReport};
pub use package::{apply_package, build_package, Assembler, DeferPolicy, PackageError};
pub use store::{ArtifactSink, StoreError, UpgradePackage, UpgradePathStore, VersionStore};

pub use upgrade_descriptor::{
    DeltaOperation, DescriptorOperation, PackageDescriptor, Version, DESCRIPTOR_FILE_NAME,
    PAYLOAD_DIR_NAME,
};
