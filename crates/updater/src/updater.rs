use crate::{
    config::UpdateConfig,
    error::{Result, UpdaterError},
    fetcher::{self, HttpFetcher, ReleaseFetcher},
    manifest::ReleaseMetadata,
    pipeline,
    platform::Capabilities,
    replace::{self, ReplaceContext, ReplaceStrategy, Replacement},
    version,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;

/// Self-updater for one executable, driven by an [`UpdateConfig`].
///
/// Each stage gates the next: metadata, version check, download and
/// verification, replacement, restart. A failure anywhere before the
/// replacement leaves the target file untouched.
pub struct Updater<F> {
    fetcher: F,
    config: UpdateConfig,
    capabilities: Capabilities,
    strategy: Arc<dyn ReplaceStrategy>,
}

impl<F> Updater<F>
where
    F: ReleaseFetcher,
{
    /// Create an updater using the platform's replacement strategy.
    pub fn new(fetcher: F, config: UpdateConfig) -> Self {
        Self {
            fetcher,
            config,
            capabilities: Capabilities::system(),
            strategy: replace::platform_strategy(),
        }
    }

    /// Substitute the OS capabilities (rename, exec, ...).
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Force a replacement strategy instead of the platform default.
    pub fn with_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ReplaceStrategy + 'static,
    {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Configuration this updater was built with.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Fetch the metadata and decide whether it describes a newer release.
    pub async fn has_newer(&self) -> Result<UpdateStatus> {
        let log = &self.config.log;
        log.info("checking for updates...");

        if self.config.metadata_url.is_empty() {
            log.info("no update URL configured - can't check");
            return Ok(UpdateStatus::UpToDate);
        }

        let metadata = fetcher::fetch_metadata(&self.fetcher, &self.config.metadata_url)
            .await
            .inspect_err(|err| log.error(format!("failed to fetch metadata: {err}")))?;

        let newer = version::should_update(
            &self.config.current_version,
            &metadata,
            &self.config.version_prefix,
        )
        .inspect_err(|err| {
            log.error(format!("failed to determine if we should update: {err}"))
        })?;

        if newer {
            Ok(UpdateStatus::Available(metadata))
        } else {
            log.info("no new version found - skipping update");
            Ok(UpdateStatus::UpToDate)
        }
    }

    /// Install the advertised release if it is newer than the running one.
    pub async fn update_if_newer(&self) -> Result<UpdateOutcome> {
        match self.has_newer().await? {
            UpdateStatus::Available(metadata) => self.update_from_metadata(&metadata).await,
            UpdateStatus::UpToDate => Ok(UpdateOutcome::UpToDate),
        }
    }

    /// Download, verify and install the release described by `metadata`.
    ///
    /// With `auto_restart` set this does not return on success: the direct
    /// strategy replaces the process image and the handoff strategy exits so
    /// the helper can finish.
    pub async fn update_from_metadata(&self, metadata: &ReleaseMetadata) -> Result<UpdateOutcome> {
        let log = &self.config.log;
        if metadata.version == self.config.current_version {
            return Ok(UpdateOutcome::UpToDate);
        }

        log.info(format!(
            "updating from {} to {}",
            self.config.current_version, metadata.version
        ));

        let target = self
            .target_path()
            .inspect_err(|err| log.error(format!("failed to determine executable path: {err}")))?;
        let download_url = metadata
            .download_url(&self.config.metadata_url)
            .inspect_err(|err| log.error(format!("failed to resolve download URL: {err}")))?;

        let artifact = pipeline::fetch_and_verify(
            &self.fetcher,
            &download_url,
            metadata,
            &target,
            self.config.public_key.as_ref().map(|key| &key[..]),
            log,
        )
        .await
        .inspect_err(|err| log.error(format!("failed to verify update: {err}")))?;

        let ctx = ReplaceContext {
            capabilities: self.capabilities.clone(),
            log: log.clone(),
            auto_restart: self.config.auto_restart,
            args: std::env::args_os().skip(1).collect(),
        };

        tracing::debug!(strategy = self.strategy.name(), target = %target.display(), "replacing executable");
        let replacement = {
            let strategy = Arc::clone(&self.strategy);
            let target = target.clone();
            let ctx = ctx.clone();
            task::spawn_blocking(move || strategy.replace(artifact, &target, &ctx))
                .await
                .map_err(|err| UpdaterError::Other(format!("task join error: {err}")))?
        }
        .inspect_err(|err| log.error(format!("failed to update: {err}")))?;

        let outcome = match replacement {
            Replacement::Replaced => UpdateOutcome::Replaced {
                version: metadata.version.clone(),
                target: target.clone(),
            },
            Replacement::Staged { staged, .. } => UpdateOutcome::HandedOff {
                version: metadata.version.clone(),
                staged,
            },
        };

        if self.config.auto_restart {
            log.info("restarting");
            self.strategy
                .restart(&target, &ctx)
                .inspect_err(|err| log.error(format!("failed to restart: {err}")))?;
        } else if matches!(outcome, UpdateOutcome::HandedOff { .. }) {
            log.info("update staged, it completes once this process exits");
        } else {
            log.info("update installed, please restart manually");
        }

        Ok(outcome)
    }

    fn target_path(&self) -> Result<PathBuf> {
        match &self.config.target_path {
            Some(path) => Ok(path.clone()),
            None => (self.capabilities.current_exe)().map_err(|err| {
                let argv0 = std::env::args_os().next().map(PathBuf::from);
                UpdaterError::fs("current_exe", argv0.unwrap_or_default(), err)
            }),
        }
    }
}

/// Check for and install an update over HTTP(S) with the platform defaults.
pub async fn update_if_newer(config: UpdateConfig) -> Result<UpdateOutcome> {
    let fetcher = HttpFetcher::builder().build()?;
    Updater::new(fetcher, config).update_if_newer().await
}

/// Result of checking for updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// There is no newer version available.
    UpToDate,
    /// A newer version is available.
    Available(ReleaseMetadata),
}

/// Result of an update attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing to do; the target was not touched.
    UpToDate,
    /// The target now holds the new release.
    Replaced {
        /// Version that was applied.
        version: String,
        /// Final location of the binary.
        target: PathBuf,
    },
    /// The release is staged and a helper process completes the swap.
    HandedOff {
        /// Version that was staged.
        version: String,
        /// Location of the staged binary (`<target>.new`).
        staged: PathBuf,
    },
}
