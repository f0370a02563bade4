use crate::process::ProcessExecutor;
use gitgate_core::diff::Patch;
use gitgate_core::domain::{
    Branch, CommitId, DiffTarget, FileChange, HeadState, LogCursor, LogPage, Remote,
    RemoteBranch, RepoSpec, StashEntry, Submodule, Tag,
};
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::{GitRepository, PatchTarget, Result, StatusEntry, StatusQuery};
use std::path::PathBuf;

mod diff;
mod discard;
mod log;
mod patch;
mod porcelain;
mod refs;
mod remotes;
mod status;
mod submodules;
mod tags;

pub(crate) struct GixRepo {
    spec: RepoSpec,
    repo: gix::ThreadSafeRepository,
    git: ProcessExecutor,
}

impl GixRepo {
    pub(crate) fn new(
        workdir: PathBuf,
        git_dir: PathBuf,
        repo: gix::ThreadSafeRepository,
        git: ProcessExecutor,
    ) -> Self {
        Self {
            spec: RepoSpec { workdir, git_dir },
            repo,
            git,
        }
    }
}

pub(crate) fn backend_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Backend(format!("{context}: {err}")))
}

impl GitRepository for GixRepo {
    fn spec(&self) -> &RepoSpec {
        &self.spec
    }

    fn head(&self) -> Result<HeadState> {
        self.head_impl()
    }

    fn sha_for_ref(&self, reference: &str) -> Option<CommitId> {
        self.sha_for_ref_impl(reference)
    }

    fn status(&self, query: &StatusQuery) -> Result<Vec<StatusEntry>> {
        self.status_impl(query)
    }

    fn diff_unified(&self, target: &DiffTarget) -> Result<String> {
        self.diff_unified_impl(target)
    }

    fn changes_for_commit(
        &self,
        commit: &CommitId,
        parent: Option<&CommitId>,
    ) -> Result<Vec<FileChange>> {
        self.changes_for_commit_impl(commit, parent)
    }

    fn contents_of_file(&self, path: &str, commit: &CommitId) -> Result<Vec<u8>> {
        self.contents_of_file_impl(path, commit)
    }

    fn contents_of_staged_file(&self, path: &str) -> Result<Vec<u8>> {
        self.contents_of_staged_file_impl(path)
    }

    fn log_head_page(&self, limit: usize, cursor: Option<&LogCursor>) -> Result<LogPage> {
        self.log_head_page_impl(limit, cursor)
    }

    fn list_branches(&self) -> Result<Vec<Branch>> {
        self.list_branches_impl()
    }

    fn list_remote_branches(&self) -> Result<Vec<RemoteBranch>> {
        self.list_remote_branches_impl()
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        self.list_tags_impl()
    }

    fn list_remotes(&self) -> Result<Vec<Remote>> {
        self.list_remotes_impl()
    }

    fn list_submodules(&self) -> Result<Vec<Submodule>> {
        self.list_submodules_impl()
    }

    fn stash_list(&self) -> Result<Vec<StashEntry>> {
        self.stash_list_impl()
    }

    fn commit(&self, message: &str, amend: bool) -> Result<()> {
        self.commit_impl(message, amend)
    }

    fn stage(&self, paths: &[&str]) -> Result<()> {
        self.stage_impl(paths)
    }

    fn unstage(&self, paths: &[&str]) -> Result<()> {
        self.unstage_impl(paths)
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.checkout_branch_impl(name)
    }

    fn discard(&self, paths: &[&str]) -> Result<()> {
        self.discard_impl(paths)
    }

    fn apply_patch(&self, patch: &Patch, target: PatchTarget, reverse: bool) -> Result<()> {
        self.apply_patch_impl(patch, target, reverse)
    }

    fn stash_save(&self, message: Option<&str>, include_untracked: bool) -> Result<()> {
        self.stash_save_impl(message, include_untracked)
    }

    fn stash_apply(&self, index: usize) -> Result<()> {
        self.stash_apply_impl(index)
    }

    fn stash_pop(&self, index: usize) -> Result<()> {
        self.stash_pop_impl(index)
    }

    fn stash_drop(&self, index: usize) -> Result<()> {
        self.stash_drop_impl(index)
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.add_remote_impl(name, url)
    }

    fn delete_remote(&self, name: &str) -> Result<()> {
        self.delete_remote_impl(name)
    }

    fn rename_remote(&self, old: &str, new: &str) -> Result<()> {
        self.rename_remote_impl(old, new)
    }

    fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.create_branch_impl(name, start_point)
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.delete_branch_impl(name)
    }

    fn rename_branch(&self, old: &str, new: &str) -> Result<()> {
        self.rename_branch_impl(old, new)
    }

    fn create_tag(&self, name: &str, target: &str, message: Option<&str>) -> Result<()> {
        self.create_tag_impl(name, target, message)
    }

    fn delete_tag(&self, name: &str) -> Result<()> {
        self.delete_tag_impl(name)
    }
}
