use super::GixRepo;
use crate::util::{parse_remote_branches, parse_remote_urls};
use gitgate_core::domain::{Remote, RemoteBranch};
use gitgate_core::services::Result;

impl GixRepo {
    /// Read through `git config` rather than gix, whose config snapshot is taken
    /// when the repository is opened.
    pub(super) fn list_remotes_impl(&self) -> Result<Vec<Remote>> {
        let output = self.git.run_accepting(
            &["config", "-z", "--get-regexp", r"^remote\..*\.url$"],
            None,
            &[0, 1],
        )?;
        let mut remotes = parse_remote_urls(&output.stdout);
        remotes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(remotes)
    }

    pub(super) fn list_remote_branches_impl(&self) -> Result<Vec<RemoteBranch>> {
        let output = self.git.capture(&[
            "for-each-ref",
            "--format=%(refname:strip=2)\t%(objectname)",
            "refs/remotes",
        ])?;
        Ok(parse_remote_branches(&output))
    }

    pub(super) fn add_remote_impl(&self, name: &str, url: &str) -> Result<()> {
        self.git.run(&["remote", "add", name, url])?;
        Ok(())
    }

    pub(super) fn delete_remote_impl(&self, name: &str) -> Result<()> {
        self.git.run(&["remote", "remove", name])?;
        Ok(())
    }

    pub(super) fn rename_remote_impl(&self, old: &str, new: &str) -> Result<()> {
        self.git.run(&["remote", "rename", old, new])?;
        Ok(())
    }
}
