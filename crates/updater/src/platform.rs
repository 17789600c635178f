//! Operating-system capabilities the update engine depends on.
//!
//! Renaming files, locating the running executable, launching processes and
//! exiting are routed through [`Capabilities`] so tests can observe or fake
//! them without touching the control flow of the engine.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Atomically rename a file within one filesystem.
pub type RenameFn = dyn Fn(&Path, &Path) -> io::Result<()> + Send + Sync;
/// Locate the running executable.
pub type CurrentExeFn = dyn Fn() -> io::Result<PathBuf> + Send + Sync;
/// Start a process without waiting for it.
pub type SpawnFn = dyn Fn(&mut Command) -> io::Result<()> + Send + Sync;
/// Replaces the process image; only returns when that failed.
pub type ExecFn = dyn Fn(&mut Command) -> io::Error + Send + Sync;
/// Terminate the current process with a status code.
pub type ExitFn = dyn Fn(i32) + Send + Sync;

/// OS operations used by the replacement and restart stages.
#[derive(Clone)]
pub struct Capabilities {
    /// See [`RenameFn`].
    pub rename: Arc<RenameFn>,
    /// See [`CurrentExeFn`].
    pub current_exe: Arc<CurrentExeFn>,
    /// See [`SpawnFn`].
    pub spawn: Arc<SpawnFn>,
    /// See [`ExecFn`].
    pub exec: Arc<ExecFn>,
    /// See [`ExitFn`].
    pub exit: Arc<ExitFn>,
}

impl Capabilities {
    /// The real operating-system implementations.
    pub fn system() -> Self {
        Self {
            rename: Arc::new(|from: &Path, to: &Path| std::fs::rename(from, to)),
            current_exe: Arc::new(std::env::current_exe),
            spawn: Arc::new(|command: &mut Command| command.spawn().map(drop)),
            exec: Arc::new(exec_command),
            exit: Arc::new(|code: i32| std::process::exit(code)),
        }
    }

    /// Override the rename operation.
    pub fn with_rename<F>(mut self, rename: F) -> Self
    where
        F: Fn(&Path, &Path) -> io::Result<()> + Send + Sync + 'static,
    {
        self.rename = Arc::new(rename);
        self
    }

    /// Override executable lookup.
    pub fn with_current_exe<F>(mut self, current_exe: F) -> Self
    where
        F: Fn() -> io::Result<PathBuf> + Send + Sync + 'static,
    {
        self.current_exe = Arc::new(current_exe);
        self
    }

    /// Override process spawning.
    pub fn with_spawn<F>(mut self, spawn: F) -> Self
    where
        F: Fn(&mut Command) -> io::Result<()> + Send + Sync + 'static,
    {
        self.spawn = Arc::new(spawn);
        self
    }

    /// Override process image replacement.
    pub fn with_exec<F>(mut self, exec: F) -> Self
    where
        F: Fn(&mut Command) -> io::Error + Send + Sync + 'static,
    {
        self.exec = Arc::new(exec);
        self
    }

    /// Override process exit.
    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(exit);
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn exec_command(command: &mut Command) -> io::Error {
    use std::os::unix::process::CommandExt;
    command.exec()
}

/// Without `exec`, the closest equivalent is starting the replacement and
/// leaving.
#[cfg(not(unix))]
fn exec_command(command: &mut Command) -> io::Error {
    match command.spawn() {
        Ok(_) => std::process::exit(0),
        Err(err) => err,
    }
}
