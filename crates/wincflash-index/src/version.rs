//! Relaxed version ordering
//!
//! Firmware versions in the catalog are mostly `MAJOR.MINOR.PATCH` with an
//! optional `-prerelease`, but some modules use free-form strings. Versions
//! that parse as dotted numbers compare numerically; anything else falls
//! back to plain string comparison.

use core::cmp::Ordering;
use core::fmt;

/// A version that may or may not be semantic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxedVersion {
    raw: String,
    numbers: Option<Vec<u64>>,
    prerelease: Option<String>,
}

impl RelaxedVersion {
    /// Parse a version string; never fails
    pub fn parse(s: &str) -> Self {
        let raw = s.trim().to_string();
        let core = raw.split('+').next().unwrap_or_default();
        let (numeric, prerelease) = match core.split_once('-') {
            Some((n, pre)) => (n, Some(pre.to_string())),
            None => (core, None),
        };

        let numbers = numeric
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()
            .filter(|n| !n.is_empty());
        let prerelease = prerelease.filter(|_| numbers.is_some());

        Self {
            raw,
            numbers,
            prerelease,
        }
    }

    /// Whether the version parsed as dotted numbers
    pub fn is_semantic(&self) -> bool {
        self.numbers.is_some()
    }

    /// Compare two versions
    pub fn compare(&self, other: &Self) -> Ordering {
        let (Some(a), Some(b)) = (&self.numbers, &other.numbers) else {
            return self.raw.cmp(&other.raw);
        };

        let len = a.len().max(b.len());
        let component = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
        for i in 0..len {
            match component(a, i).cmp(&component(b, i)) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        // A release sorts after any of its prereleases
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_prerelease(x, y),
        }
    }

    /// Whether `self` is strictly newer than `other`
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

/// Semver precedence for dot-separated prerelease identifiers
///
/// Numeric identifiers compare as numbers and sort below alphanumeric ones;
/// a shorter list sorts first when all shared identifiers are equal.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let (x, y) = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => (x, y),
        };
        let ord = match (numeric_identifier(x), numeric_identifier(y)) {
            (Some(m), Some(n)) => m.cmp(&n),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn numeric_identifier(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for RelaxedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
