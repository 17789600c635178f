use crate::error::{Result, UpdaterError};
use crate::signing;
use crate::version::SemanticVersion;
use serde::{Deserialize, Serialize};
use url::Url;

/// Signed description of one release, as published next to the artefact.
///
/// ```json
/// {
///   "version": "v1.2.3",
///   "sha256": "ce9f2b63...",
///   "signature": "base64...",
///   "downloadUrl": "app-v1.2.3.gz"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Version string of the release, prefix included (e.g. `v1.2.3`).
    pub version: String,
    /// Lowercase hex SHA-256 of the uncompressed artefact.
    #[serde(rename = "sha256")]
    pub checksum: String,
    /// Base64 Ed25519 signature over `version + "+" + checksum`.
    #[serde(default)]
    pub signature: String,
    /// Absolute URL, or a reference relative to the metadata document.
    #[serde(rename = "downloadUrl", default)]
    pub download_url: String,
}

impl ReleaseMetadata {
    /// Decode metadata from a JSON document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let metadata: ReleaseMetadata = serde_json::from_slice(bytes)?;
        if metadata.version.trim().is_empty() {
            return Err(UpdaterError::parse("metadata has no version"));
        }
        if metadata.checksum.trim().is_empty() {
            return Err(UpdaterError::parse("metadata has no sha256"));
        }
        Ok(metadata)
    }

    /// The message the release signature covers.
    pub fn signed_message(&self) -> String {
        signing::signed_message(&self.version, &self.checksum)
    }

    /// Parse the release version after stripping `prefix`.
    pub fn parsed_version(&self, prefix: &str) -> Result<SemanticVersion> {
        SemanticVersion::parse(&self.version, prefix)
    }

    /// Absolute download URL, resolved against `metadata_url` when relative.
    pub fn download_url(&self, metadata_url: &str) -> Result<Url> {
        resolve_download_url(metadata_url, &self.download_url)
    }

    /// Whether `actual` equals the published checksum, ignoring hex case.
    pub fn checksum_matches(&self, actual: &str) -> bool {
        self.checksum.trim().eq_ignore_ascii_case(actual)
    }
}

/// Resolve `download_ref` against the URL the metadata was fetched from.
///
/// Absolute references are returned as-is; everything else follows RFC 3986
/// reference resolution relative to the metadata document.
pub fn resolve_download_url(metadata_url: &str, download_ref: &str) -> Result<Url> {
    let download_ref = download_ref.trim();
    if download_ref.is_empty() {
        return Err(UpdaterError::parse("metadata has no downloadUrl"));
    }

    match Url::parse(download_ref) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(metadata_url).map_err(|err| {
                UpdaterError::parse(format!("invalid metadata URL {metadata_url:?}: {err}"))
            })?;
            base.join(download_ref).map_err(|err| {
                UpdaterError::parse(format!("invalid downloadUrl {download_ref:?}: {err}"))
            })
        }
        Err(err) => Err(UpdaterError::parse(format!(
            "invalid downloadUrl {download_ref:?}: {err}"
        ))),
    }
}
