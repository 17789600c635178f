//! Out-of-process replacement for platforms that lock a running executable.
//!
//! The parent stages `<target>.new` and `<target>.new.meta`, then starts the
//! staged binary with [`ENV_UPDATE_HELPER`] set on the child only. That
//! helper process calls [`maybe_run_update_helper`] early in `main`, re-checks
//! the staged bytes against the record on its own, and keeps retrying the
//! final rename until the parent has exited and released the target.
//!
//! The two processes share nothing but the filesystem and the environment
//! the parent hands to the child. The helper never takes a path from the
//! environment: it locates itself through the OS and derives everything else
//! from that.

use super::{
    current_permissions, sidecar_path, strip_suffix, ReplaceContext, ReplaceStrategy, Replacement,
};
use crate::error::{Result, UpdaterError};
use crate::manifest::ReleaseMetadata;
use crate::pipeline::VerifiedArtifact;
use crate::platform::Capabilities;
use crate::restart;
use crate::signing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Set to `1` on the helper child; selects helper mode.
pub const ENV_UPDATE_HELPER: &str = "SAFEDATE_UPDATE_HELPER";
/// `1` when the helper should relaunch the target after the swap.
pub const ENV_AUTO_RESTART: &str = "SAFEDATE_AUTO_RESTART";
/// JSON array of the parent's arguments, program name excluded.
pub const ENV_ORIG_ARGS: &str = "SAFEDATE_ORIG_ARGS";

pub(crate) const HELPER_ENV_VARS: [&str; 3] = [ENV_UPDATE_HELPER, ENV_AUTO_RESTART, ENV_ORIG_ARGS];

const NEW_SUFFIX: &str = ".new";
const META_SUFFIX: &str = ".meta";

/// Stage the artefact and delegate the swap to a helper process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandoffReplace;

impl ReplaceStrategy for HandoffReplace {
    fn name(&self) -> &'static str {
        "handoff"
    }

    fn replace(
        &self,
        artifact: VerifiedArtifact,
        target: &Path,
        ctx: &ReplaceContext,
    ) -> Result<Replacement> {
        let staged = PendingUpdateRecord::staged_path(target);
        let record_path = PendingUpdateRecord::record_path(target);

        // The staged file is launched directly, so it needs the target's mode.
        let previous = current_permissions(target)?;
        fs::set_permissions(artifact.path(), previous)
            .map_err(|err| UpdaterError::fs("chmod", artifact.path(), err))?;

        let (temp, metadata) = artifact.into_parts();
        (ctx.capabilities.rename)(&*temp, staged.as_path())
            .map_err(|err| UpdaterError::fs("rename", &staged, err))?;
        let _ = temp.keep();

        let staged_result = PendingUpdateRecord::new(metadata)
            .write(&record_path)
            .and_then(|()| {
                let mut command = helper_command(&staged, ctx);
                (ctx.capabilities.spawn)(&mut command).map_err(|source| UpdaterError::Launch {
                    path: staged.clone(),
                    source,
                })
            });

        if let Err(err) = staged_result {
            // Nothing was handed off; do not leave a half-staged pair behind.
            let _ = fs::remove_file(&record_path);
            let _ = fs::remove_file(&staged);
            return Err(err);
        }

        ctx.log.info(format!(
            "update staged at {}; helper will finish once this process exits",
            staged.display()
        ));
        Ok(Replacement::Staged {
            staged,
            record: record_path,
        })
    }

    fn restart(&self, _target: &Path, ctx: &ReplaceContext) -> Result<()> {
        // The helper relaunches the target; the parent only has to get out of
        // its way.
        ctx.log.info("exiting so the update helper can complete");
        (ctx.capabilities.exit)(0);
        Ok(())
    }
}

fn helper_command(staged: &Path, ctx: &ReplaceContext) -> Command {
    let args: Vec<String> = ctx
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let encoded_args = serde_json::to_string(&args).unwrap_or_else(|_| "[]".to_string());

    let mut command = Command::new(staged);
    for var in HELPER_ENV_VARS {
        command.env_remove(var);
    }
    command
        .env(ENV_UPDATE_HELPER, "1")
        .env(ENV_AUTO_RESTART, if ctx.auto_restart { "1" } else { "0" })
        .env(ENV_ORIG_ARGS, encoded_args);
    command
}

/// Side-car record persisted next to a staged binary while a handoff is in flight.
///
/// The file holds the release metadata verbatim, so the helper can repeat
/// the checksum and signature checks without trusting its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingUpdateRecord {
    /// Metadata the staged binary was verified against.
    pub metadata: ReleaseMetadata,
}

impl PendingUpdateRecord {
    /// Wrap verified release metadata.
    pub fn new(metadata: ReleaseMetadata) -> Self {
        Self { metadata }
    }

    /// `<target>.new`
    pub fn staged_path(target: &Path) -> PathBuf {
        sidecar_path(target, NEW_SUFFIX)
    }

    /// `<target>.new.meta`
    pub fn record_path(target: &Path) -> PathBuf {
        sidecar_path(&Self::staged_path(target), META_SUFFIX)
    }

    /// Load the record for `target`, if an update is pending.
    pub fn load(target: &Path) -> Result<Option<Self>> {
        let path = Self::record_path(target);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    /// Remove a lingering staged binary and record for `target`.
    ///
    /// Returns whether anything was removed.
    pub fn discard(target: &Path) -> Result<bool> {
        let mut removed = false;
        for path in [Self::record_path(target), Self::staged_path(target)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(UpdaterError::fs("remove", path, err)),
            }
        }
        Ok(removed)
    }

    fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| {
            UpdaterError::helper(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            UpdaterError::helper(format!("malformed record {}: {err}", path.display()))
        })
    }

    fn write(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_vec(self)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .map_err(|err| UpdaterError::fs("create", path, err))?;
        file.write_all(&encoded)
            .and_then(|()| file.sync_all())
            .map_err(|err| UpdaterError::fs("write", path, err))
    }
}

/// Bounded retry policy for the helper's final rename.
///
/// The parent may need a moment to exit after starting the helper, and the
/// target stays locked until it does. The defaults give up after
/// [`total_budget`](Self::total_budget) = 100 x 200 ms = 20 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameRetry {
    /// Rename attempts before giving up (at least one is always made).
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Default for RenameRetry {
    fn default() -> Self {
        Self {
            attempts: 100,
            interval: Duration::from_millis(200),
        }
    }
}

impl RenameRetry {
    /// Policy making `attempts` tries spaced by `interval`.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound on the time spent waiting for the target to unlock.
    pub fn total_budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }

    fn run<F>(&self, mut op: F) -> io::Result<u32>
    where
        F: FnMut() -> io::Result<()>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => return Ok(attempt),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "rename not possible yet, retrying");
                    thread::sleep(self.interval);
                    attempt += 1;
                }
            }
        }
    }
}

/// Values the parent passed to the helper child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperEnv {
    /// Relaunch the target once the swap is done.
    pub auto_restart: bool,
    /// Arguments of the parent, program name excluded.
    pub original_args: Vec<String>,
}

impl HelperEnv {
    /// Read helper settings from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `None` unless helper mode is requested.
    pub fn from_lookup<L>(lookup: L) -> Option<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        if lookup(ENV_UPDATE_HELPER).as_deref() != Some("1") {
            return None;
        }
        let auto_restart = lookup(ENV_AUTO_RESTART).as_deref() == Some("1");
        let original_args = match lookup(ENV_ORIG_ARGS) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring malformed original arguments");
                Vec::new()
            }),
            _ => Vec::new(),
        };
        Some(Self {
            auto_restart,
            original_args,
        })
    }
}

/// Entry point for binaries using the handoff strategy; call it first thing
/// in `main` with the embedded public key.
///
/// Returns immediately unless this process was started as an update helper.
/// In helper mode the process exits: status 0 after a completed swap,
/// status 1 on any failure.
pub fn maybe_run_update_helper(public_key: &[u8]) {
    maybe_run_update_helper_with(public_key, &Capabilities::system(), RenameRetry::default());
}

/// [`maybe_run_update_helper`] with explicit capabilities and retry policy.
pub fn maybe_run_update_helper_with(
    public_key: &[u8],
    capabilities: &Capabilities,
    retry: RenameRetry,
) {
    maybe_run_update_helper_with_env(public_key, HelperEnv::from_env(), capabilities, retry);
}

/// Helper-mode dispatch for an already-read environment.
///
/// `env` is `None` outside helper mode. Even with helper mode requested,
/// nothing happens unless the running executable is a staged `.new` file.
pub fn maybe_run_update_helper_with_env(
    public_key: &[u8],
    env: Option<HelperEnv>,
    capabilities: &Capabilities,
    retry: RenameRetry,
) {
    let Some(env) = env else {
        return;
    };

    // A stray variable must not turn an ordinary run into a helper.
    match (capabilities.current_exe)() {
        Ok(exe) if strip_suffix(&exe, NEW_SUFFIX).is_some() => {}
        _ => {
            tracing::warn!("{ENV_UPDATE_HELPER} is set but this is not a staged binary; ignoring");
            return;
        }
    }

    match run_update_helper(public_key, &env, capabilities, retry) {
        Ok(target) => {
            tracing::info!(target = %target.display(), "update helper finished");
            (capabilities.exit)(0);
        }
        Err(err) => {
            tracing::error!(error = %err, "update helper failed");
            (capabilities.exit)(1);
        }
    }
}

/// Helper-mode body: re-verify the staged binary and move it into place.
///
/// Returns the path of the replaced target.
pub fn run_update_helper(
    public_key: &[u8],
    env: &HelperEnv,
    capabilities: &Capabilities,
    retry: RenameRetry,
) -> Result<PathBuf> {
    let exe = (capabilities.current_exe)()
        .map_err(|err| UpdaterError::helper(format!("cannot locate running executable: {err}")))?;
    let target = strip_suffix(&exe, NEW_SUFFIX).ok_or_else(|| {
        UpdaterError::helper(format!(
            "{} is not a staged binary (no {NEW_SUFFIX} suffix)",
            exe.display()
        ))
    })?;
    let record_path = sidecar_path(&exe, META_SUFFIX);
    let record = PendingUpdateRecord::read(&record_path)?;

    verify_staged(&exe, &record.metadata, public_key)
        .map_err(|err| UpdaterError::helper(format!("re-verification failed: {err}")))?;

    let attempts = retry
        .run(|| (capabilities.rename)(exe.as_path(), target.as_path()))
        .map_err(|err| UpdaterError::fs("rename", &target, err))?;
    tracing::debug!(attempts, "staged binary moved into place");

    if let Err(err) = fs::remove_file(&record_path) {
        tracing::warn!(path = %record_path.display(), error = %err, "failed to remove update record");
    }

    if env.auto_restart {
        let mut command = restart::relaunch_command(&target, &env.original_args);
        if let Err(err) = (capabilities.spawn)(&mut command) {
            tracing::warn!(target = %target.display(), error = %err, "failed to restart updated binary");
        }
    }

    Ok(target)
}

fn verify_staged(exe: &Path, metadata: &ReleaseMetadata, public_key: &[u8]) -> Result<()> {
    let actual = signing::checksum_file(exe)?;
    if !metadata.checksum_matches(&actual) {
        return Err(UpdaterError::ChecksumMismatch {
            expected: metadata.checksum.clone(),
            actual,
        });
    }
    if !signing::verify_raw(public_key, &metadata.signed_message(), &metadata.signature)? {
        return Err(UpdaterError::SignatureInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogHooks;
    use crate::signing::KeyPair;
    use crate::testing::{sha256_hex, verified_artifact};
    use std::collections::HashMap;
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Debug, Clone)]
    struct Launched {
        program: PathBuf,
        args: Vec<String>,
        env: HashMap<String, Option<String>>,
    }

    fn record_launches(capabilities: Capabilities) -> (Capabilities, Arc<Mutex<Vec<Launched>>>) {
        let launched = Arc::new(Mutex::new(Vec::new()));
        let sink = launched.clone();
        let capabilities = capabilities.with_spawn(move |command| {
            sink.lock().unwrap().push(Launched {
                program: PathBuf::from(command.get_program()),
                args: command
                    .get_args()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
                env: command
                    .get_envs()
                    .map(|(key, value)| {
                        (
                            key.to_string_lossy().into_owned(),
                            value.map(|v| v.to_string_lossy().into_owned()),
                        )
                    })
                    .collect(),
            });
            Ok(())
        });
        (capabilities, launched)
    }

    struct Staged {
        _dir: tempfile::TempDir,
        target: PathBuf,
        staged: PathBuf,
        record: PathBuf,
        pair: KeyPair,
    }

    /// Lay out `<target>`, `<target>.new` and `<target>.new.meta` as the
    /// parent would, with `record_checksum` written into the record.
    fn stage(record_checksum: Option<&str>) -> Staged {
        let dir = tempdir().unwrap();
        let target = dir.path().join("myapp.exe");
        let staged = PendingUpdateRecord::staged_path(&target);
        let record = PendingUpdateRecord::record_path(&target);
        fs::write(&target, b"old-binary").unwrap();
        fs::write(&staged, b"new-binary").unwrap();

        let pair = KeyPair::generate();
        let checksum = record_checksum
            .map(str::to_string)
            .unwrap_or_else(|| sha256_hex(b"new-binary"));
        let metadata = ReleaseMetadata {
            version: "v1.2.3".into(),
            signature: pair
                .sign(&signing::signed_message("v1.2.3", &checksum))
                .unwrap(),
            checksum,
            download_url: "myapp.gz".into(),
        };
        PendingUpdateRecord::new(metadata).write(&record).unwrap();

        Staged {
            _dir: dir,
            target,
            staged,
            record,
            pair,
        }
    }

    fn helper_capabilities(staged: &Path) -> Capabilities {
        let exe = staged.to_path_buf();
        Capabilities::system().with_current_exe(move || Ok(exe.clone()))
    }

    fn no_retry() -> RenameRetry {
        RenameRetry::new(1, Duration::ZERO)
    }

    #[test]
    fn helper_swaps_verified_binary_and_cleans_record() {
        let fixture = stage(None);
        let (capabilities, launched) = record_launches(helper_capabilities(&fixture.staged));

        let target = run_update_helper(
            &fixture.pair.public_key_bytes(),
            &HelperEnv::default(),
            &capabilities,
            no_retry(),
        )
        .expect("helper succeeds");

        assert_eq!(target, fixture.target);
        assert_eq!(fs::read(&fixture.target).unwrap(), b"new-binary");
        assert!(!fixture.staged.exists());
        assert!(!fixture.record.exists());
        assert!(launched.lock().unwrap().is_empty());
    }

    #[test]
    fn helper_rejects_record_with_wrong_checksum() {
        let fixture = stage(Some(&sha256_hex(b"something-else")));
        let capabilities = helper_capabilities(&fixture.staged)
            .with_rename(|_, _| panic!("rename must not run for unverified content"));

        let err = run_update_helper(
            &fixture.pair.public_key_bytes(),
            &HelperEnv::default(),
            &capabilities,
            no_retry(),
        )
        .unwrap_err();

        assert!(matches!(err, UpdaterError::HelperProtocol(_)));
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
        assert!(fixture.staged.exists());
    }

    #[test]
    fn helper_rejects_signature_from_another_key() {
        let fixture = stage(None);
        let capabilities = helper_capabilities(&fixture.staged)
            .with_rename(|_, _| panic!("rename must not run for unverified content"));
        let stranger = KeyPair::generate();

        let err = run_update_helper(
            &stranger.public_key_bytes(),
            &HelperEnv::default(),
            &capabilities,
            no_retry(),
        )
        .unwrap_err();

        assert!(matches!(err, UpdaterError::HelperProtocol(_)));
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
    }

    #[test]
    fn helper_requires_staged_name_and_record() {
        let fixture = stage(None);
        let key = fixture.pair.public_key_bytes();

        let not_staged = helper_capabilities(&fixture.target);
        let err = run_update_helper(&key, &HelperEnv::default(), &not_staged, no_retry())
            .unwrap_err();
        assert!(matches!(err, UpdaterError::HelperProtocol(_)));

        fs::remove_file(&fixture.record).unwrap();
        let capabilities = helper_capabilities(&fixture.staged);
        let err = run_update_helper(&key, &HelperEnv::default(), &capabilities, no_retry())
            .unwrap_err();
        assert!(matches!(err, UpdaterError::HelperProtocol(_)));
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
    }

    #[test]
    fn helper_retries_until_target_is_released() {
        let fixture = stage(None);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let capabilities = helper_capabilities(&fixture.staged).with_rename(move |from, to| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "in use"))
            } else {
                fs::rename(from, to)
            }
        });

        run_update_helper(
            &fixture.pair.public_key_bytes(),
            &HelperEnv::default(),
            &capabilities,
            RenameRetry::new(5, Duration::ZERO),
        )
        .expect("fourth attempt succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(fs::read(&fixture.target).unwrap(), b"new-binary");
    }

    #[test]
    fn helper_gives_up_after_retry_budget() {
        let fixture = stage(None);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let capabilities = helper_capabilities(&fixture.staged).with_rename(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "in use"))
        });

        let err = run_update_helper(
            &fixture.pair.public_key_bytes(),
            &HelperEnv::default(),
            &capabilities,
            RenameRetry::new(3, Duration::ZERO),
        )
        .unwrap_err();

        assert!(matches!(err, UpdaterError::Filesystem { op: "rename", .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(fixture.record.exists(), "record stays for a later run");
    }

    #[test]
    fn helper_restarts_target_with_original_args() {
        let fixture = stage(None);
        let (capabilities, launched) = record_launches(helper_capabilities(&fixture.staged));
        let env = HelperEnv {
            auto_restart: true,
            original_args: vec!["--serve".into(), "8080".into()],
        };

        run_update_helper(
            &fixture.pair.public_key_bytes(),
            &env,
            &capabilities,
            no_retry(),
        )
        .unwrap();

        let launched = launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].program, fixture.target);
        assert_eq!(launched[0].args, vec!["--serve", "8080"]);
        assert_eq!(launched[0].env.get(ENV_UPDATE_HELPER), Some(&None));
    }

    #[test]
    fn parent_stages_binary_record_and_launches_helper() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("myapp.exe");
        fs::write(&target, b"old-binary").unwrap();

        let artifact = verified_artifact(dir.path(), b"new-binary");
        let metadata = artifact.metadata().clone();
        let (capabilities, launched) = record_launches(Capabilities::system());
        let ctx = ReplaceContext {
            capabilities,
            log: LogHooks::default(),
            auto_restart: true,
            args: vec![OsString::from("--flag"), OsString::from("value")],
        };

        let outcome = HandoffReplace.replace(artifact, &target, &ctx).unwrap();

        let staged = PendingUpdateRecord::staged_path(&target);
        let record = PendingUpdateRecord::record_path(&target);
        assert_eq!(
            outcome,
            Replacement::Staged {
                staged: staged.clone(),
                record: record.clone()
            }
        );
        assert_eq!(fs::read(&target).unwrap(), b"old-binary");
        assert_eq!(fs::read(&staged).unwrap(), b"new-binary");
        assert_eq!(
            PendingUpdateRecord::load(&target).unwrap(),
            Some(PendingUpdateRecord::new(metadata))
        );

        let launched = launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        let helper = &launched[0];
        assert_eq!(helper.program, staged);
        assert!(helper.args.is_empty());
        assert_eq!(helper.env[ENV_UPDATE_HELPER].as_deref(), Some("1"));
        assert_eq!(helper.env[ENV_AUTO_RESTART].as_deref(), Some("1"));
        assert_eq!(
            helper.env[ENV_ORIG_ARGS].as_deref(),
            Some(r#"["--flag","value"]"#)
        );
    }

    #[test]
    fn failed_launch_unstages_everything() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("myapp.exe");
        fs::write(&target, b"old-binary").unwrap();

        let artifact = verified_artifact(dir.path(), b"new-binary");
        let ctx = ReplaceContext {
            capabilities: Capabilities::system()
                .with_spawn(|_| Err(io::Error::new(io::ErrorKind::NotFound, "gone"))),
            log: LogHooks::default(),
            auto_restart: false,
            args: Vec::new(),
        };

        let err = HandoffReplace.replace(artifact, &target, &ctx).unwrap_err();
        assert!(matches!(err, UpdaterError::Launch { .. }));
        assert_eq!(PendingUpdateRecord::load(&target).unwrap(), None);
        assert!(!PendingUpdateRecord::staged_path(&target).exists());
        assert_eq!(fs::read(&target).unwrap(), b"old-binary");
    }

    #[test]
    fn discard_removes_lingering_pair() {
        let fixture = stage(None);
        assert!(PendingUpdateRecord::load(&fixture.target).unwrap().is_some());
        assert!(PendingUpdateRecord::discard(&fixture.target).unwrap());
        assert!(!fixture.staged.exists());
        assert!(!fixture.record.exists());
        assert!(!PendingUpdateRecord::discard(&fixture.target).unwrap());
    }

    #[test]
    fn helper_env_requires_explicit_flag() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_AUTO_RESTART, "1"),
            (ENV_ORIG_ARGS, r#"["a","b"]"#),
        ]);
        assert_eq!(
            HelperEnv::from_lookup(|key| vars.get(key).map(|v| v.to_string())),
            None
        );

        let mut vars = vars;
        vars.insert(ENV_UPDATE_HELPER, "1");
        assert_eq!(
            HelperEnv::from_lookup(|key| vars.get(key).map(|v| v.to_string())),
            Some(HelperEnv {
                auto_restart: true,
                original_args: vec!["a".into(), "b".into()],
            })
        );
    }

    fn record_exits(capabilities: Capabilities) -> (Capabilities, Arc<Mutex<Vec<i32>>>) {
        let exits = Arc::new(Mutex::new(Vec::new()));
        let sink = exits.clone();
        let capabilities = capabilities.with_exit(move |code| sink.lock().unwrap().push(code));
        (capabilities, exits)
    }

    #[test]
    fn helper_flag_is_ignored_for_unstaged_executable() {
        let fixture = stage(None);
        let (capabilities, exits) = record_exits(
            helper_capabilities(&fixture.target)
                .with_rename(|_, _| panic!("an ordinary run must not rename anything")),
        );

        maybe_run_update_helper_with_env(
            &fixture.pair.public_key_bytes(),
            Some(HelperEnv::default()),
            &capabilities,
            no_retry(),
        );

        assert!(exits.lock().unwrap().is_empty());
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
        assert!(fixture.staged.exists());
        assert!(fixture.record.exists());
    }

    #[test]
    fn no_helper_env_is_a_no_op() {
        let fixture = stage(None);
        let (capabilities, exits) = record_exits(
            helper_capabilities(&fixture.staged)
                .with_rename(|_, _| panic!("an ordinary run must not rename anything")),
        );

        maybe_run_update_helper_with_env(
            &fixture.pair.public_key_bytes(),
            None,
            &capabilities,
            no_retry(),
        );

        assert!(exits.lock().unwrap().is_empty());
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
    }

    #[test]
    fn staged_helper_exits_zero_after_swap() {
        let fixture = stage(None);
        let (capabilities, exits) = record_exits(helper_capabilities(&fixture.staged));

        maybe_run_update_helper_with_env(
            &fixture.pair.public_key_bytes(),
            Some(HelperEnv::default()),
            &capabilities,
            no_retry(),
        );

        assert_eq!(*exits.lock().unwrap(), vec![0]);
        assert_eq!(fs::read(&fixture.target).unwrap(), b"new-binary");
        assert!(!fixture.record.exists());
    }

    #[test]
    fn staged_helper_exits_one_on_bad_record() {
        let fixture = stage(Some(&sha256_hex(b"something-else")));
        let (capabilities, exits) = record_exits(
            helper_capabilities(&fixture.staged)
                .with_rename(|_, _| panic!("rename must not run for unverified content")),
        );

        maybe_run_update_helper_with_env(
            &fixture.pair.public_key_bytes(),
            Some(HelperEnv::default()),
            &capabilities,
            no_retry(),
        );

        assert_eq!(*exits.lock().unwrap(), vec![1]);
        assert_eq!(fs::read(&fixture.target).unwrap(), b"old-binary");
        assert!(fixture.staged.exists());
    }

    #[test]
    fn retry_budget_is_documented_total() {
        assert_eq!(RenameRetry::default().total_budget(), Duration::from_secs(20));
    }
}
