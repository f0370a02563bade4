use super::GixRepo;
use gitgate_core::diff::Patch;
use gitgate_core::services::{PatchTarget, Result};

impl GixRepo {
    /// `git apply` is all-or-nothing, so a stale hunk leaves index and worktree untouched.
    pub(super) fn apply_patch_impl(
        &self,
        patch: &Patch,
        target: PatchTarget,
        reverse: bool,
    ) -> Result<()> {
        let mut args = vec!["apply", "--recount", "--whitespace=nowarn"];
        if target == PatchTarget::Index {
            args.push("--cached");
        }
        if reverse {
            args.push("--reverse");
        }
        args.push("-");

        self.git
            .run_with_stdin(&args, patch.text.as_bytes())
            .map_err(|e| e.with_args([patch.path.clone()]))?;
        Ok(())
    }
}
