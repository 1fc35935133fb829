//! Manifest delta calculation
//!
//! Compares two manifests into a per-path operation set. Pure, no I/O.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use upgrade_descriptor::DeltaOperation;

use crate::manifest::FileManifest;

/// Per-path operations turning one version's tree into another's.
///
/// Unchanged paths are absent. Each path carries exactly one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaOperationSet {
    operations: BTreeMap<String, DeltaOperation>,
}

impl DeltaOperationSet {
    pub fn get(&self, path: &str) -> Option<DeltaOperation> {
        self.operations.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, DeltaOperation)> {
        self.operations.iter().map(|(p, op)| (p.as_str(), *op))
    }

    /// Number of paths with the given operation
    pub fn count(&self, op: DeltaOperation) -> usize {
        self.operations.values().filter(|o| **o == op).count()
    }

    /// SHA-256 over the sorted `(path, operation)` pairs.
    ///
    /// Identical change sets always share a fingerprint. Used for logging
    /// only.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, op) in &self.operations {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(op.as_str().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<(String, DeltaOperation)> for DeltaOperationSet {
    fn from_iter<I: IntoIterator<Item = (String, DeltaOperation)>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

/// Classify every path that differs between `from` and `to`.
///
/// - in `from` only: removed
/// - in both with different digests: modified
/// - in `to` only: added
pub fn compute_delta(from: &FileManifest, to: &FileManifest) -> DeltaOperationSet {
    let mut operations = BTreeMap::new();

    for (path, digest) in from.iter() {
        match to.get(path) {
            None => {
                operations.insert(path.to_string(), DeltaOperation::Removed);
            }
            Some(next) if next != digest => {
                operations.insert(path.to_string(), DeltaOperation::Modified);
            }
            Some(_) => {}
        }
    }

    for path in to.paths() {
        if !from.contains(path) {
            operations.insert(path.to_string(), DeltaOperation::Added);
        }
    }

    DeltaOperationSet { operations }
}
