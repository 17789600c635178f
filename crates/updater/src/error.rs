use std::path::PathBuf;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while checking for, verifying or applying an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// Network request failed or the server answered with a non-2xx status.
    #[error("transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The release metadata could not be decoded or is incomplete.
    #[error("malformed release metadata: {0}")]
    Parse(String),
    /// A version string is not of the `major.minor.patch` form.
    #[error("invalid version {input:?}: {reason}")]
    VersionParse {
        /// The offending input, before prefix stripping.
        input: String,
        /// Why the input was rejected.
        reason: String,
    },
    /// The artefact hash did not match the metadata.
    #[error("checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch {
        /// Expected SHA-256 digest from the metadata.
        expected: String,
        /// Digest computed over the artefact bytes.
        actual: String,
    },
    /// The downloaded artefact is not a valid gzip stream.
    #[error("failed to decompress artefact: {0}")]
    Decompress(#[source] std::io::Error),
    /// The release signature did not verify against the embedded key.
    #[error("signature verification failed")]
    SignatureInvalid,
    /// A private or public key could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Attempted to sign an empty message.
    #[error("refusing to sign an empty message")]
    EmptyInput,
    /// A signature was not valid base64.
    #[error("malformed base64 signature: {0}")]
    Decode(#[from] base64::DecodeError),
    /// Key generation would overwrite an existing key file.
    #[error("key file already exists: {0}")]
    KeysAlreadyExist(PathBuf),
    /// A filesystem operation on `path` failed.
    #[error("filesystem operation `{op}` failed on {path:?}: {source}")]
    Filesystem {
        /// Short name of the operation (`rename`, `write`, ...).
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to perform an I/O operation not tied to a single path.
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The handoff side-car state is missing, malformed or failed re-verification.
    #[error("update helper protocol error: {0}")]
    HelperProtocol(String),
    /// Spawning or exec'ing a process failed.
    #[error("failed to launch {path:?}: {source}")]
    Launch {
        /// Executable that was being launched.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl UpdaterError {
    /// Helper for wrapping metadata validation failures.
    pub fn parse(msg: impl Into<String>) -> Self {
        UpdaterError::Parse(msg.into())
    }

    /// Helper for attaching a path to an I/O failure.
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    /// Helper for handoff protocol violations.
    pub fn helper(msg: impl Into<String>) -> Self {
        UpdaterError::HelperProtocol(msg.into())
    }
}

impl From<serde_json::Error> for UpdaterError {
    fn from(err: serde_json::Error) -> Self {
        UpdaterError::Parse(err.to_string())
    }
}
