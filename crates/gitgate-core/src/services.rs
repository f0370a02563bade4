use crate::change::StatusFlags;
use crate::diff::Patch;
use crate::domain::*;
use crate::error::{Error, ErrorKind};
use std::path::Path;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        let mut out = String::new();
        if !self.stdout.trim().is_empty() {
            out.push_str(self.stdout.trim_end());
            out.push('\n');
        }
        if !self.stderr.trim().is_empty() {
            out.push_str(self.stderr.trim_end());
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// One row of a workspace status query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusEntry {
    pub path: String,
    pub flags: StatusFlags,
    /// Source path of a rename.
    pub orig_path: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct StatusQuery {
    pub include_unmodified: bool,
    pub include_ignored: bool,
}

/// Where a patch is applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchTarget {
    Index,
    Worktree,
}

fn unsupported<T>(what: &'static str) -> Result<T> {
    Err(Error::new(ErrorKind::Unsupported(what)))
}

/// The opaque repository service.
///
/// Implementations run on whichever thread calls them and do no locking of their
/// own; write serialization is the caller's job.
pub trait GitRepository: Send + Sync {
    fn spec(&self) -> &RepoSpec;

    fn head(&self) -> Result<HeadState>;
    /// Resolves any revision expression. Unresolvable input yields `None`.
    fn sha_for_ref(&self, reference: &str) -> Option<CommitId>;
    fn status(&self, query: &StatusQuery) -> Result<Vec<StatusEntry>>;
    fn diff_unified(&self, target: &DiffTarget) -> Result<String>;

    fn changes_for_commit(
        &self,
        _commit: &CommitId,
        _parent: Option<&CommitId>,
    ) -> Result<Vec<FileChange>> {
        unsupported("commit changes are not implemented for this backend")
    }
    fn contents_of_file(&self, _path: &str, _commit: &CommitId) -> Result<Vec<u8>> {
        unsupported("blob reads are not implemented for this backend")
    }
    fn contents_of_staged_file(&self, _path: &str) -> Result<Vec<u8>> {
        unsupported("index reads are not implemented for this backend")
    }
    fn log_head_page(&self, _limit: usize, _cursor: Option<&LogCursor>) -> Result<LogPage> {
        unsupported("history is not implemented for this backend")
    }

    fn list_branches(&self) -> Result<Vec<Branch>> {
        unsupported("branch listing is not implemented for this backend")
    }
    fn list_remote_branches(&self) -> Result<Vec<RemoteBranch>> {
        unsupported("remote branch listing is not implemented for this backend")
    }
    fn list_tags(&self) -> Result<Vec<Tag>> {
        unsupported("tag listing is not implemented for this backend")
    }
    fn list_remotes(&self) -> Result<Vec<Remote>> {
        unsupported("remote listing is not implemented for this backend")
    }
    fn list_submodules(&self) -> Result<Vec<Submodule>> {
        unsupported("submodule listing is not implemented for this backend")
    }
    fn stash_list(&self) -> Result<Vec<StashEntry>> {
        unsupported("stash listing is not implemented for this backend")
    }

    fn commit(&self, message: &str, amend: bool) -> Result<()>;
    fn stage(&self, paths: &[&str]) -> Result<()>;
    fn unstage(&self, paths: &[&str]) -> Result<()>;

    fn checkout_branch(&self, _name: &str) -> Result<()> {
        unsupported("checkout is not implemented for this backend")
    }
    /// Reverts workspace files to their staged (or committed) content.
    fn discard(&self, _paths: &[&str]) -> Result<()> {
        unsupported("discard is not implemented for this backend")
    }
    fn apply_patch(&self, _patch: &Patch, _target: PatchTarget, _reverse: bool) -> Result<()> {
        unsupported("patch application is not implemented for this backend")
    }

    fn stash_save(&self, _message: Option<&str>, _include_untracked: bool) -> Result<()> {
        unsupported("stash is not implemented for this backend")
    }
    fn stash_apply(&self, _index: usize) -> Result<()> {
        unsupported("stash is not implemented for this backend")
    }
    fn stash_pop(&self, _index: usize) -> Result<()> {
        unsupported("stash is not implemented for this backend")
    }
    fn stash_drop(&self, _index: usize) -> Result<()> {
        unsupported("stash is not implemented for this backend")
    }

    fn add_remote(&self, _name: &str, _url: &str) -> Result<()> {
        unsupported("remote management is not implemented for this backend")
    }
    fn delete_remote(&self, _name: &str) -> Result<()> {
        unsupported("remote management is not implemented for this backend")
    }
    fn rename_remote(&self, _old: &str, _new: &str) -> Result<()> {
        unsupported("remote management is not implemented for this backend")
    }

    fn create_branch(&self, _name: &str, _start_point: &str) -> Result<()> {
        unsupported("branch management is not implemented for this backend")
    }
    fn delete_branch(&self, _name: &str) -> Result<()> {
        unsupported("branch management is not implemented for this backend")
    }
    fn rename_branch(&self, _old: &str, _new: &str) -> Result<()> {
        unsupported("branch management is not implemented for this backend")
    }

    fn create_tag(&self, _name: &str, _target: &str, _message: Option<&str>) -> Result<()> {
        unsupported("tag management is not implemented for this backend")
    }
    fn delete_tag(&self, _name: &str) -> Result<()> {
        unsupported("tag management is not implemented for this backend")
    }
}

pub trait GitBackend: Send + Sync {
    fn open(&self, workdir: &Path) -> Result<Arc<dyn GitRepository>>;
}
