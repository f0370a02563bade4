use super::GixRepo;
use crate::util::parse_stash_list;
use gitgate_core::domain::StashEntry;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;

impl GixRepo {
    pub(super) fn commit_impl(&self, message: &str, amend: bool) -> Result<()> {
        let mut args = vec!["-c", "commit.gpgsign=false", "commit", "-m", message];
        if amend {
            args.push("--amend");
        }
        self.git.run(&args)?;
        Ok(())
    }

    pub(super) fn stage_impl(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "-A", "--"];
        args.extend_from_slice(paths);
        self.git.run(&args)?;
        Ok(())
    }

    pub(super) fn unstage_impl(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        // Without HEAD there is nothing to reset to; drop the entries instead.
        let mut args = if self.sha_for_ref_impl("HEAD").is_some() {
            vec!["reset", "-q", "HEAD", "--"]
        } else {
            vec!["rm", "--cached", "-q", "-r", "--"]
        };
        args.extend_from_slice(paths);
        self.git.run(&args)?;
        Ok(())
    }

    pub(super) fn stash_list_impl(&self) -> Result<Vec<StashEntry>> {
        let output = self
            .git
            .capture(&["--no-pager", "stash", "list", "--format=%gd%x00%gs"]);
        match output {
            Ok(output) => Ok(parse_stash_list(&output)),
            // No stash reflog yet.
            Err(e) if *e.kind() == ErrorKind::RefNotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub(super) fn stash_save_impl(&self, message: Option<&str>, include_untracked: bool) -> Result<()> {
        let mut args = vec!["stash", "push"];
        if include_untracked {
            args.push("-u");
        }
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            args.extend(["-m", message]);
        }
        self.git.run(&args)?;
        Ok(())
    }

    pub(super) fn stash_apply_impl(&self, index: usize) -> Result<()> {
        let selector = self.stash_selector(index)?;
        self.git.run(&["stash", "apply", &selector])?;
        Ok(())
    }

    pub(super) fn stash_pop_impl(&self, index: usize) -> Result<()> {
        let selector = self.stash_selector(index)?;
        self.git.run(&["stash", "pop", &selector])?;
        Ok(())
    }

    pub(super) fn stash_drop_impl(&self, index: usize) -> Result<()> {
        let selector = self.stash_selector(index)?;
        self.git.run(&["stash", "drop", &selector])?;
        Ok(())
    }

    /// Re-resolves `index` against the current stash list; another tool may have
    /// pushed or dropped entries since the caller listed them.
    fn stash_selector(&self, index: usize) -> Result<String> {
        let entries = self.stash_list_impl()?;
        if !entries.iter().any(|e| e.index == index) {
            return Err(Error::new(ErrorKind::RefNotFound)
                .with_output(format!(
                    "stash@{{{index}}} does not exist ({} stash entries)",
                    entries.len()
                ))
                .with_args([format!("stash@{{{index}}}")]));
        }
        Ok(format!("stash@{{{index}}}"))
    }
}
