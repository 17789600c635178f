use crate::error::{Result, UpdaterError};
use crate::manifest::ReleaseMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// Abstraction over retrieving release metadata and artefacts.
///
/// Implementations report connection failures and non-2xx answers as
/// [`UpdaterError::Transport`] and never retry on their own.
#[async_trait]
pub trait ReleaseFetcher: Send + Sync {
    /// Fetch a small document fully into memory.
    async fn fetch_bytes(&self, url: &Url) -> Result<Bytes>;

    /// Stream the resource at `url` into `sink`, returning the number of bytes written.
    async fn download(&self, url: &Url, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;
}

/// Fetch and decode the release metadata published at `url`.
pub async fn fetch_metadata<F>(fetcher: &F, url: &str) -> Result<ReleaseMetadata>
where
    F: ReleaseFetcher + ?Sized,
{
    let url = Url::parse(url)
        .map_err(|err| UpdaterError::parse(format!("invalid metadata URL {url:?}: {err}")))?;
    let bytes = fetcher.fetch_bytes(&url).await?;
    ReleaseMetadata::from_json(&bytes)
}

/// Builder for [`HttpFetcher`].
#[derive(Default)]
pub struct HttpFetcherBuilder {
    client: Option<Client>,
    user_agent: Option<String>,
}

impl HttpFetcherBuilder {
    /// Provide a custom reqwest client instance.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Override the `User-Agent` header used for every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HttpFetcher> {
        let client = match self.client {
            Some(client) => client,
            None => {
                let user_agent = self.user_agent.unwrap_or_else(|| {
                    format!("safedate-updater/{}", env!("CARGO_PKG_VERSION"))
                });
                Client::builder().user_agent(user_agent).build()?
            }
        };
        Ok(HttpFetcher { client })
    }
}

/// HTTP(S) fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new builder.
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }
}

#[async_trait]
impl ReleaseFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &Url) -> Result<Bytes> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn download(&self, url: &Url, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        tracing::debug!(%url, bytes = written, "download finished");
        Ok(written)
    }
}
