//! Shared fixtures for the unit tests.

use crate::error::{Result, UpdaterError};
use crate::fetcher::ReleaseFetcher;
use crate::manifest::ReleaseMetadata;
use crate::pipeline::VerifiedArtifact;
use crate::signing;
use async_trait::async_trait;
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

pub(crate) struct MockFetcher {
    entries: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&mut self, url: &str, data: Vec<u8>) {
        self.entries.insert(url.to_string(), data);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn lookup(&self, url: &Url) -> Result<&Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.entries
            .get(url.as_str())
            .ok_or_else(|| UpdaterError::Other(format!("no mock response for {url}")))
    }
}

#[async_trait]
impl ReleaseFetcher for MockFetcher {
    async fn fetch_bytes(&self, url: &Url) -> Result<Bytes> {
        Ok(Bytes::from(self.lookup(url)?.clone()))
    }

    async fn download(&self, url: &Url, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let data = self.lookup(url)?.clone();
        sink.write_all(&data).await?;
        Ok(data.len() as u64)
    }
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    signing::checksum(data).unwrap()
}

/// A verified artefact holding `content`, as the pipeline would hand it over.
pub(crate) fn verified_artifact(dir: &Path, content: &[u8]) -> VerifiedArtifact {
    let mut temp = tempfile::Builder::new()
        .prefix(".artifact-")
        .tempfile_in(dir)
        .unwrap();
    temp.write_all(content).unwrap();
    let metadata = ReleaseMetadata {
        version: "v1.2.4".into(),
        checksum: sha256_hex(content),
        signature: String::new(),
        download_url: "myapp.gz".into(),
    };
    VerifiedArtifact::from_parts(temp.into_temp_path(), metadata)
}
