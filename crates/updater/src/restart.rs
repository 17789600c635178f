//! Relaunching the updated executable.

use crate::error::{Result, UpdaterError};
use crate::platform::Capabilities;
use crate::replace::HELPER_ENV_VARS;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

/// Command that starts `path` with `args`, the current environment and the
/// current stdio.
///
/// Handoff variables are stripped so the relaunched binary never comes up in
/// helper mode.
pub fn relaunch_command<S: AsRef<OsStr>>(path: &Path, args: &[S]) -> Command {
    let mut command = Command::new(path);
    command
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    for var in HELPER_ENV_VARS {
        command.env_remove(var);
    }
    command
}

/// Replace the current process image with `path`.
///
/// Only returns if the replacement could not be started.
pub fn exec_replacement<S: AsRef<OsStr>>(
    path: &Path,
    args: &[S],
    capabilities: &Capabilities,
) -> Result<()> {
    tracing::info!(path = %path.display(), "restarting into updated binary");
    let mut command = relaunch_command(path, args);
    let source = (capabilities.exec)(&mut command);
    Err(UpdaterError::Launch {
        path: path.to_path_buf(),
        source,
    })
}
