//! Download, decompress and verify a release artefact next to its target.
//!
//! Nothing in here touches the target executable. The only file that
//! survives a successful run is the verified artefact, owned by the returned
//! [`VerifiedArtifact`] and removed when it is dropped without being
//! installed.

use crate::config::LogHooks;
use crate::error::{Result, UpdaterError};
use crate::fetcher::ReleaseFetcher;
use crate::manifest::ReleaseMetadata;
use crate::signing;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tokio::io::AsyncWriteExt;
use tokio::task;
use url::Url;

/// Decompressed artefact whose checksum and signature have been verified.
#[derive(Debug)]
pub struct VerifiedArtifact {
    path: TempPath,
    metadata: ReleaseMetadata,
}

impl VerifiedArtifact {
    /// Location of the verified bytes (same directory as the target).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata the artefact was verified against.
    pub fn metadata(&self) -> &ReleaseMetadata {
        &self.metadata
    }

    #[cfg(test)]
    pub(crate) fn from_parts(path: TempPath, metadata: ReleaseMetadata) -> Self {
        Self { path, metadata }
    }

    /// Hand the temporary file over to the replacement stage.
    pub(crate) fn into_parts(self) -> (TempPath, ReleaseMetadata) {
        (self.path, self.metadata)
    }
}

/// Run the full fetch-and-verify gate for `metadata`.
///
/// Steps, in order: download the gzip artefact into the target's directory,
/// decompress it, compare its SHA-256 with the metadata, verify the release
/// signature when `public_key` is set, and flush the result to disk. The
/// signature is never looked at when the checksum does not match.
pub async fn fetch_and_verify<F>(
    fetcher: &F,
    download_url: &Url,
    metadata: &ReleaseMetadata,
    target: &Path,
    public_key: Option<&[u8]>,
    log: &LogHooks,
) -> Result<VerifiedArtifact>
where
    F: ReleaseFetcher + ?Sized,
{
    let dir = staging_dir(target);
    let stem = format!(".{}-{}.", file_name(target), metadata.version);

    let compressed = Builder::new()
        .prefix(&stem)
        .suffix(".gz")
        .tempfile_in(&dir)
        .map_err(|err| UpdaterError::fs("create", &dir, err))?;
    let (file, compressed_path) = compressed.into_parts();

    log.info(format!("downloading {download_url}"));
    let mut sink = tokio::fs::File::from_std(file);
    let size = fetcher
        .download(download_url, &mut sink)
        .await
        .map_err(|err| match err {
            UpdaterError::Io(source) => UpdaterError::fs("write", &*compressed_path, source),
            other => other,
        })?;
    sink.flush()
        .await
        .map_err(|err| UpdaterError::fs("write", &*compressed_path, err))?;
    drop(sink);
    tracing::debug!(bytes = size, path = %compressed_path.display(), "artefact downloaded");

    let metadata = metadata.clone();
    let public_key = public_key.map(<[u8]>::to_vec);
    let log = log.clone();
    task::spawn_blocking(move || {
        verify_download(compressed_path, &dir, &stem, metadata, public_key.as_deref(), &log)
    })
    .await
    .map_err(|err| UpdaterError::Other(format!("task join error: {err}")))?
}

fn verify_download(
    compressed: TempPath,
    dir: &Path,
    stem: &str,
    metadata: ReleaseMetadata,
    public_key: Option<&[u8]>,
    log: &LogHooks,
) -> Result<VerifiedArtifact> {
    let mut decompressed = Builder::new()
        .prefix(stem)
        .tempfile_in(dir)
        .map_err(|err| UpdaterError::fs("create", dir, err))?;

    {
        let source =
            File::open(&compressed).map_err(|err| UpdaterError::fs("open", &*compressed, err))?;
        let mut decoder = GzDecoder::new(BufReader::new(source));
        io::copy(&mut decoder, decompressed.as_file_mut()).map_err(UpdaterError::Decompress)?;
    }
    drop(compressed);

    log.info("verifying checksum");
    let path = decompressed.path().to_path_buf();
    let file = decompressed.as_file_mut();
    file.seek(SeekFrom::Start(0))
        .map_err(|err| UpdaterError::fs("seek", &path, err))?;
    let actual = signing::checksum(BufReader::new(&*file))
        .map_err(|err| UpdaterError::fs("read", &path, err))?;
    if !metadata.checksum_matches(&actual) {
        return Err(UpdaterError::ChecksumMismatch {
            expected: metadata.checksum.clone(),
            actual,
        });
    }

    if let Some(key) = public_key {
        log.info("verifying signature");
        if !signing::verify_raw(key, &metadata.signed_message(), &metadata.signature)? {
            return Err(UpdaterError::SignatureInvalid);
        }
    }

    decompressed
        .as_file()
        .sync_all()
        .map_err(|err| UpdaterError::fs("sync", decompressed.path(), err))?;

    Ok(VerifiedArtifact {
        path: decompressed.into_temp_path(),
        metadata,
    })
}

/// Temp files must live next to the target so the final rename stays on one
/// filesystem.
fn staging_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(target: &Path) -> String {
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "update".to_string())
}
