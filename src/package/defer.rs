//! Deferred-file policy
//!
//! Very large opaque blobs (packed content archives) change wholesale on
//! every release. They stay in the descriptor but never enter the payload;
//! clients fetch them in full.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Default patterns for opaque files
pub const DEFAULT_DEFERRED_PATTERNS: &[&str] = &["**/*.pak"];

/// Glob set selecting files that are deferred rather than copied.
///
/// Matching is case-insensitive, so `Game.PAK` and `game.pak` are treated
/// alike.
#[derive(Debug, Clone)]
pub struct DeferPolicy {
    glob_set: GlobSet,
    patterns: Vec<String>,
}

impl Default for DeferPolicy {
    fn default() -> Self {
        Self::from_patterns(DEFAULT_DEFERRED_PATTERNS).unwrap_or_else(|e| {
            tracing::error!(error = %e, "built-in deferred patterns rejected, deferring nothing");
            Self::none()
        })
    }
}

impl DeferPolicy {
    /// Build a policy from explicit patterns. Empty patterns are ignored.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
            kept.push(pattern.to_string());
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: kept,
        })
    }

    /// A policy that defers nothing.
    pub fn none() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check a manifest-relative path (forward slashes).
    pub fn is_deferred(&self, rel_path: &str) -> bool {
        self.glob_set.is_match(rel_path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
