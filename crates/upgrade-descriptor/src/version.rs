//! Release version identifiers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::DescriptorError;

/// A release version, the string form of a changelist or build number.
///
/// Versions made only of ASCII digits compare numerically, so `"10"` sorts
/// after `"9"`, and every numeric version sorts before every non-numeric one.
/// Non-numeric versions compare as plain strings. Equal numeric values with
/// different spellings (`"010"` and `"10"`) are ordered by their raw strings,
/// which keeps `Ord` consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parse a version, rejecting empty strings and path separators.
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(DescriptorError::InvalidVersion(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The version as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the version is a plain changelist number.
    pub fn is_numeric(&self) -> bool {
        self.0.bytes().all(|b| b.is_ascii_digit())
    }

    fn numeric_key(&self) -> Option<&str> {
        if !self.is_numeric() {
            return None;
        }
        let stripped = self.0.trim_start_matches('0');
        Some(if stripped.is_empty() { "0" } else { stripped })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_key(), other.numeric_key()) {
            // No integer parse, so arbitrarily long changelists never overflow.
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("10") > v("9"));
        assert!(v("3395761") > v("3301923"));
        assert!(v("100000000000000000000000") > v("99999999999999999999999"));
    }

    #[test]
    fn test_leading_zeros_compare_numerically() {
        assert!(v("010") > v("9"));
        assert_ne!(v("010"), v("10"));
        assert_ne!(v("010").cmp(&v("10")), Ordering::Equal);
    }

    #[test]
    fn test_non_numeric_falls_back_to_string_order() {
        assert!(v("b") > v("a"));
        assert!(v("1.10") < v("1.9"));
    }

    #[test]
    fn test_numeric_sorts_before_non_numeric() {
        assert!(v("10") < v("1x"));
        assert!(v("2") < v("1x"));
        assert!(v("99999999") < v("a"));
        assert!(v("1x") < v("2b"));
    }

    #[test]
    fn test_mixed_ordering_is_transitive() {
        let versions = [v("2"), v("10"), v("1x"), v("2b"), v("010"), v("0"), v("b")];
        for a in &versions {
            for b in &versions {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{a} vs {b}");
                for c in &versions {
                    if a < b && b < c {
                        assert!(a < c, "{a} < {b} < {c} but not {a} < {c}");
                    }
                }
            }
        }

        let mut sorted = versions.to_vec();
        sorted.sort();
        let names: Vec<_> = sorted.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["0", "2", "010", "10", "1x", "2b", "b"]);
    }

    #[test]
    fn test_sorting() {
        let mut versions = vec![v("10"), v("9"), v("100"), v("1")];
        versions.sort();
        let sorted: Vec<_> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["1", "9", "10", "100"]);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("   ").is_err());
        assert!(Version::parse("..").is_err());
        assert!(Version::parse("a/b").is_err());
        assert!(Version::parse("a\\b").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("3395761")).unwrap();
        assert_eq!(json, "\"3395761\"");

        let parsed: Version = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(parsed, v("42"));

        assert!(serde_json::from_str::<Version>("\"\"").is_err());
    }
}
