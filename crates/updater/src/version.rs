//! Release version parsing and the "is this an upgrade" decision.

use crate::error::{Result, UpdaterError};
use crate::manifest::ReleaseMetadata;
use std::fmt;

/// Marker that identifies non-release builds; update checks are disabled for them.
pub const DEV_MARKER: &str = "dev";

/// Strict `major.minor.patch` version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    /// Incompatible release line.
    pub major: u64,
    /// Feature release within the line.
    pub minor: u64,
    /// Fix release.
    pub patch: u64,
}

impl SemanticVersion {
    /// Construct a version from its three components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `input` after stripping `prefix` (e.g. `v`).
    ///
    /// Exactly three dot-separated unsigned integers are accepted; leading
    /// zeros are allowed (`1.02.3` is `1.2.3`). Pre-release and build
    /// suffixes are rejected.
    pub fn parse(input: &str, prefix: &str) -> Result<Self> {
        let stripped = input.trim();
        let stripped = stripped.strip_prefix(prefix).unwrap_or(stripped);
        let invalid = |reason: String| UpdaterError::VersionParse {
            input: input.to_string(),
            reason,
        };

        let parts: Vec<&str> = stripped.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid(format!(
                "expected three dot-separated components, got {}",
                parts.len()
            )));
        };

        let component = |name: &str, raw: &str| -> Result<u64> {
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("{name} component {raw:?} is not an integer")));
            }
            raw.parse::<u64>()
                .map_err(|err| invalid(format!("{name} component {raw:?}: {err}")))
        };

        Ok(Self::new(
            component("major", major)?,
            component("minor", minor)?,
            component("patch", patch)?,
        ))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Decide whether `candidate` should replace a binary running `current_version`.
///
/// Empty or development versions never update. Equal versions do not update.
pub fn should_update(
    current_version: &str,
    candidate: &ReleaseMetadata,
    prefix: &str,
) -> Result<bool> {
    if current_version.trim().is_empty() || current_version.contains(DEV_MARKER) {
        return Ok(false);
    }

    let current = SemanticVersion::parse(current_version, prefix)?;
    let next = candidate.parsed_version(prefix)?;
    Ok(next > current)
}
