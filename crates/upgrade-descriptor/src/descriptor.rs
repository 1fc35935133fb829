//! Package descriptor (operations.json)
//!
//! A flat JSON object mapping every changed relative path to its operation.
//! Keys are always written in sorted order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use crate::error::{io_err, DescriptorError};
use crate::operation::DescriptorOperation;

/// Descriptor shipped inside every upgrade package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageDescriptor {
    operations: BTreeMap<String, DescriptorOperation>,
}

impl PackageDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the operation for a path, replacing any previous one.
    pub fn insert(&mut self, path: impl Into<String>, op: DescriptorOperation) {
        self.operations.insert(path.into(), op);
    }

    pub fn get(&self, path: &str) -> Option<DescriptorOperation> {
        self.operations.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DescriptorOperation)> {
        self.operations.iter().map(|(p, op)| (p.as_str(), *op))
    }

    /// Paths recorded with the given operation, in path order.
    pub fn paths_with(&self, op: DescriptorOperation) -> Vec<&str> {
        self.iter()
            .filter(|(_, o)| *o == op)
            .map(|(p, _)| p)
            .collect()
    }

    /// Paths whose content ships in the payload.
    pub fn payload_paths(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, op)| op.in_payload())
            .map(|(p, _)| p)
            .collect()
    }

    /// Reject absolute paths and paths that climb out of the package root.
    pub fn validate_paths(&self) -> Result<(), DescriptorError> {
        for path in self.operations.keys() {
            if !is_safe_relative(path) {
                return Err(DescriptorError::UnsafePath(path.clone()));
            }
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> Result<(), DescriptorError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| io_err(path, e))
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let json = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Ok(Self::from_json(&json)?)
    }
}

impl FromIterator<(String, DescriptorOperation)> for PackageDescriptor {
    fn from_iter<I: IntoIterator<Item = (String, DescriptorOperation)>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}
