use super::{current_permissions, ReplaceContext, ReplaceStrategy, Replacement};
use crate::error::{Result, UpdaterError};
use crate::pipeline::VerifiedArtifact;
use crate::restart;
use std::fs;
use std::path::Path;

/// Rename the verified artefact straight onto the target.
///
/// Used where the OS allows replacing the file behind a running executable.
/// The rename stays within one directory, so the target path resolves to
/// either the old or the new content at every instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectReplace;

impl ReplaceStrategy for DirectReplace {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn replace(
        &self,
        artifact: VerifiedArtifact,
        target: &Path,
        ctx: &ReplaceContext,
    ) -> Result<Replacement> {
        let previous = current_permissions(target)?;
        let (temp, _) = artifact.into_parts();

        (ctx.capabilities.rename)(&*temp, target)
            .map_err(|err| UpdaterError::fs("rename", target, err))?;
        // The bytes now live at `target`; stop the guard from deleting them.
        let _ = temp.keep();

        // A fresh temp file is owner-only and not executable.
        if let Err(err) = fs::set_permissions(target, previous) {
            ctx.log.error(format!(
                "failed to restore permissions on {}: {err}",
                target.display()
            ));
        }
        Ok(Replacement::Replaced)
    }

    fn restart(&self, target: &Path, ctx: &ReplaceContext) -> Result<()> {
        restart::exec_replacement(target, &ctx.args, &ctx.capabilities)
    }
}
