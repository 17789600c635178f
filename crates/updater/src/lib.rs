//! Signed, atomic self-update for standalone executables.
//!
//! Releases are described by a small JSON metadata document holding the
//! version, the SHA-256 checksum of the uncompressed binary, an Ed25519
//! signature over `"<version>+<checksum>"` and a (possibly relative) URL of
//! the gzip-compressed artefact. The updater fetches the metadata, decides
//! whether the release is newer, downloads and verifies the artefact next to
//! the running binary, and swaps it in so the executable path always holds
//! either the complete old or the complete new binary.
//!
//! ```ignore
//! use safedate_updater::{UpdateConfig, UpdateOutcome};
//!
//! const PUBLIC_KEY: [u8; 32] = [0u8; 32];
//!
//! # async fn demo() -> safedate_updater::Result<()> {
//! // Must run before anything else when the handoff strategy is in use.
//! safedate_updater::maybe_run_update_helper(&PUBLIC_KEY);
//!
//! let config = UpdateConfig::new("https://example.com/myapp/metadata.json", "v1.2.3")
//!     .with_public_key(PUBLIC_KEY)
//!     .with_auto_restart(true);
//! match safedate_updater::update_if_newer(config).await? {
//!     UpdateOutcome::UpToDate => println!("already at latest version"),
//!     outcome => println!("{outcome:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod fetcher;
mod manifest;
mod pipeline;
mod platform;
mod replace;
mod restart;
pub mod signing;
mod updater;
mod version;

#[cfg(test)]
mod testing;

pub use config::{LogFn, LogHooks, UpdateConfig};
pub use error::{Result, UpdaterError};
pub use fetcher::{fetch_metadata, HttpFetcher, HttpFetcherBuilder, ReleaseFetcher};
pub use manifest::{resolve_download_url, ReleaseMetadata};
pub use pipeline::{fetch_and_verify, VerifiedArtifact};
pub use platform::Capabilities;
pub use replace::{
    maybe_run_update_helper, maybe_run_update_helper_with, maybe_run_update_helper_with_env,
    platform_strategy, run_update_helper, DirectReplace, HandoffReplace, HelperEnv,
    PendingUpdateRecord, RenameRetry, ReplaceContext, ReplaceStrategy, Replacement,
    ENV_AUTO_RESTART, ENV_ORIG_ARGS, ENV_UPDATE_HELPER,
};
pub use restart::{exec_replacement, relaunch_command};
pub use signing::{checksum, checksum_file, signed_message, sign, verify, verify_raw, KeyPair};
pub use updater::{update_if_newer, UpdateOutcome, UpdateStatus, Updater};
pub use version::{should_update, SemanticVersion, DEV_MARKER};
