//! Per-path delta operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Difference between two manifests for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOperation {
    /// Present only in the target version.
    Added,
    /// Present in both versions with different content.
    Modified,
    /// Present only in the source version.
    Removed,
}

impl DeltaOperation {
    /// Stable name, also used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }

    /// Whether the target content must reach the client.
    pub fn carries_payload(&self) -> bool {
        matches!(self, Self::Added | Self::Modified)
    }
}

impl fmt::Display for DeltaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation as recorded in a package descriptor.
///
/// `ModifiedDeferred` marks an opaque file whose content is not in the
/// payload; the client fetches it in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorOperation {
    Added,
    Modified,
    Removed,
    ModifiedDeferred,
}

impl DescriptorOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::ModifiedDeferred => "modified-deferred",
        }
    }

    /// Whether the file ships inside the package payload.
    pub fn in_payload(&self) -> bool {
        matches!(self, Self::Added | Self::Modified)
    }
}

impl From<DeltaOperation> for DescriptorOperation {
    fn from(op: DeltaOperation) -> Self {
        match op {
            DeltaOperation::Added => Self::Added,
            DeltaOperation::Modified => Self::Modified,
            DeltaOperation::Removed => Self::Removed,
        }
    }
}

impl fmt::Display for DescriptorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&DeltaOperation::Modified).unwrap(),
            "\"modified\""
        );
        assert_eq!(
            serde_json::to_string(&DescriptorOperation::ModifiedDeferred).unwrap(),
            "\"modified-deferred\""
        );
        let parsed: DescriptorOperation = serde_json::from_str("\"removed\"").unwrap();
        assert_eq!(parsed, DescriptorOperation::Removed);
    }

    #[test]
    fn test_display_matches_wire_name() {
        for op in [
            DescriptorOperation::Added,
            DescriptorOperation::Modified,
            DescriptorOperation::Removed,
            DescriptorOperation::ModifiedDeferred,
        ] {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op));
        }
    }

    #[test]
    fn test_payload_classification() {
        assert!(DeltaOperation::Added.carries_payload());
        assert!(!DeltaOperation::Removed.carries_payload());
        assert!(!DescriptorOperation::ModifiedDeferred.in_payload());
        assert_eq!(
            DescriptorOperation::from(DeltaOperation::Removed),
            DescriptorOperation::Removed
        );
    }
}
