use ed25519_dalek::PUBLIC_KEY_LENGTH;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Caller-supplied log sink. Receives fully formatted messages.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional `(info, error)` hooks mirroring the updater's progress messages.
///
/// Every message is also emitted as a `tracing` event, so callers that already
/// install a subscriber can leave both hooks unset.
#[derive(Clone, Default)]
pub struct LogHooks {
    /// Receives progress messages.
    pub info: Option<LogFn>,
    /// Receives failure messages.
    pub error: Option<LogFn>,
}

impl LogHooks {
    /// Emit a progress message.
    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{message}");
        if let Some(hook) = &self.info {
            hook(message);
        }
    }

    /// Emit a failure message.
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{message}");
        if let Some(hook) = &self.error {
            hook(message);
        }
    }
}

impl fmt::Debug for LogHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHooks")
            .field("info", &self.info.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Parameters for one update attempt. The engine never mutates it.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Where the release metadata document is published.
    pub metadata_url: String,
    /// Raw Ed25519 public key; when unset the signature gate is skipped.
    pub public_key: Option<[u8; PUBLIC_KEY_LENGTH]>,
    /// Version of the running binary, e.g. `env!("CARGO_PKG_VERSION")`.
    pub current_version: String,
    /// Executable to replace; defaults to the running executable.
    pub target_path: Option<PathBuf>,
    /// Relaunch the updated binary with the original arguments.
    pub auto_restart: bool,
    /// Prefix stripped from version strings before parsing.
    pub version_prefix: String,
    /// Optional caller log hooks.
    pub log: LogHooks,
}

impl UpdateConfig {
    /// Configuration with defaults: no key, running executable, no restart, `v` prefix.
    pub fn new(metadata_url: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            public_key: None,
            current_version: current_version.into(),
            target_path: None,
            auto_restart: false,
            version_prefix: "v".to_string(),
            log: LogHooks::default(),
        }
    }

    /// Require releases to be signed by `key`.
    pub fn with_public_key(mut self, key: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        self.public_key = Some(key);
        self
    }

    /// Replace `path` instead of the running executable.
    pub fn with_target_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    /// Relaunch the updated binary after a successful update.
    pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    /// Prefix stripped before version comparison.
    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    /// Install the progress hook.
    pub fn with_info_log<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log.info = Some(Arc::new(hook));
        self
    }

    /// Install the failure hook.
    pub fn with_error_log<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log.error = Some(Arc::new(hook));
        self
    }
}
