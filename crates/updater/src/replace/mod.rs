//! Installing a verified artefact over the target executable.
//!
//! Either the target ends up holding the new bytes in full or it is left as
//! it was. How that is achieved depends on whether the platform lets a
//! process replace its own running image:
//!
//! * [`DirectReplace`] renames the artefact straight onto the target.
//! * [`HandoffReplace`] stages `<target>.new` plus a `.meta` record and lets
//!   a helper process, started from the staged binary, finish the swap once
//!   the original process has released its lock.

mod direct;
mod handoff;

pub use direct::DirectReplace;
pub use handoff::{
    maybe_run_update_helper, maybe_run_update_helper_with, maybe_run_update_helper_with_env,
    run_update_helper, HandoffReplace, HelperEnv, PendingUpdateRecord, RenameRetry,
    ENV_AUTO_RESTART, ENV_ORIG_ARGS, ENV_UPDATE_HELPER,
};
pub(crate) use handoff::HELPER_ENV_VARS;

use crate::config::LogHooks;
use crate::error::{Result, UpdaterError};
use crate::pipeline::VerifiedArtifact;
use crate::platform::Capabilities;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a strategy needs besides the artefact and the target.
#[derive(Debug, Clone)]
pub struct ReplaceContext {
    /// OS operations to use.
    pub capabilities: Capabilities,
    /// Progress and failure hooks.
    pub log: LogHooks,
    /// Whether the updated binary will be relaunched.
    pub auto_restart: bool,
    /// Arguments of the running process, program name excluded.
    pub args: Vec<OsString>,
}

/// What a strategy left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// The target now holds the new executable.
    Replaced,
    /// The new executable is staged and a helper process will finish the swap.
    Staged {
        /// `<target>.new`
        staged: PathBuf,
        /// `<target>.new.meta`
        record: PathBuf,
    },
}

/// Replace the running executable with verified content.
pub trait ReplaceStrategy: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Install `artifact` at `target`.
    fn replace(
        &self,
        artifact: VerifiedArtifact,
        target: &Path,
        ctx: &ReplaceContext,
    ) -> Result<Replacement>;

    /// Bring the updated binary up after a successful [`replace`](Self::replace).
    fn restart(&self, target: &Path, ctx: &ReplaceContext) -> Result<()>;
}

/// Strategy for the platform this crate was built for.
pub fn platform_strategy() -> Arc<dyn ReplaceStrategy> {
    #[cfg(windows)]
    {
        Arc::new(HandoffReplace::default())
    }
    #[cfg(not(windows))]
    {
        Arc::new(DirectReplace)
    }
}

/// `path` with `suffix` appended to its file name (`app` -> `app.new`).
pub(crate) fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

pub(crate) fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name().and_then(OsStr::to_str)?;
    let stripped = name.strip_suffix(suffix)?;
    if stripped.is_empty() {
        return None;
    }
    Some(path.with_file_name(stripped))
}

pub(crate) fn current_permissions(target: &Path) -> Result<fs::Permissions> {
    fs::metadata(target)
        .map(|meta| meta.permissions())
        .map_err(|err| UpdaterError::fs("stat", target, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_paths_append_to_file_name() {
        let target = Path::new("/opt/app/bin/myapp.exe");
        let staged = sidecar_path(target, ".new");
        assert_eq!(staged, Path::new("/opt/app/bin/myapp.exe.new"));
        assert_eq!(
            sidecar_path(&staged, ".meta"),
            Path::new("/opt/app/bin/myapp.exe.new.meta")
        );
        assert_eq!(strip_suffix(&staged, ".new").as_deref(), Some(target));
    }

    #[test]
    fn strip_suffix_requires_the_suffix() {
        assert_eq!(strip_suffix(Path::new("/opt/app/myapp"), ".new"), None);
        assert_eq!(strip_suffix(Path::new("/opt/app/.new"), ".new"), None);
    }
}
