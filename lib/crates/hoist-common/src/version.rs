//! Four-part dotted version numbers (`major.minor.patch.build`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version tag {tag:?}: expected four numeric dot-separated parts")]
pub struct InvalidVersionError {
    pub tag: String,
}

/// A parsed version. Ordering is numeric and lexicographic by part, so
/// `1.10.0.0` sorts after `1.9.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionNumber {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

impl FromStr for VersionNumber {
    type Err = InvalidVersionError;

    /// Parses the first four dot-separated parts; anything after them is
    /// ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersionError { tag: s.to_string() };
        let mut parts = s.split('.');
        let mut next = || -> Result<u64, InvalidVersionError> {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        Ok(Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
            build: next()?,
        })
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Sorts tags ascending by version. Equal versions keep their input order.
///
/// # Errors
///
/// Returns the first tag that fails to parse; `tags` is left untouched.
pub fn sort_tags(tags: &mut [String]) -> Result<(), InvalidVersionError> {
    let mut keyed = tags
        .iter()
        .map(|t| t.parse::<VersionNumber>().map(|v| (v, t.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by_key(|(v, _)| *v);
    for (slot, (_, tag)) in tags.iter_mut().zip(keyed) {
        *slot = tag;
    }
    Ok(())
}

/// The highest tag, or `None` when there are no tags.
///
/// # Errors
///
/// Returns the first tag that fails to parse.
pub fn latest(tags: &[String]) -> Result<Option<String>, InvalidVersionError> {
    let mut best: Option<(VersionNumber, &String)> = None;
    for tag in tags {
        let version = tag.parse::<VersionNumber>()?;
        if best.is_none_or(|(b, _)| version >= b) {
            best = Some((version, tag));
        }
    }
    Ok(best.map(|(_, tag)| tag.clone()))
}
