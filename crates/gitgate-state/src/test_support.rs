use gitgate_core::change::StatusFlags;
use gitgate_core::diff::Patch;
use gitgate_core::domain::*;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::{GitRepository, PatchTarget, Result, StatusEntry, StatusQuery};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

pub(crate) const FAKE_DIFF: &str = "@@ -1 +1 @@\n-x\n+y\n";

#[derive(Default)]
pub(crate) struct FakeState {
    pub status: Vec<StatusEntry>,
    pub commit_changes: Vec<FileChange>,
    pub head: HeadState,
    pub branches: Vec<String>,
    /// Oldest first.
    pub commits: Vec<Commit>,
    /// Every write in the order it ran.
    pub write_log: Vec<String>,
    pub fail_next_diff: bool,
    pub stash_conflict: bool,
    pub write_delay: Duration,
}

/// In-memory repository that records how it is driven.
pub(crate) struct FakeRepo {
    spec: RepoSpec,
    state: Mutex<FakeState>,
    in_write: AtomicBool,
    overlaps: AtomicUsize,
    diff_calls: AtomicUsize,
    log_page_calls: AtomicUsize,
}

impl FakeRepo {
    pub(crate) fn new() -> Self {
        Self {
            spec: RepoSpec {
                workdir: PathBuf::from("/fake"),
                git_dir: PathBuf::from("/fake/.git"),
            },
            state: Mutex::new(FakeState {
                head: HeadState {
                    reference: Some("refs/heads/main".into()),
                    branch: Some("main".into()),
                    commit: None,
                },
                branches: vec!["main".into()],
                ..FakeState::default()
            }),
            in_write: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            diff_calls: AtomicUsize::new(0),
            log_page_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub(crate) fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn log_page_calls(&self) -> usize {
        self.log_page_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn write_log(&self) -> Vec<String> {
        self.state().write_log.clone()
    }

    /// Appends a commit on top of HEAD without going through a write.
    pub(crate) fn push_commit(&self, message: &str) -> CommitId {
        push_commit(&mut self.state(), message)
    }

    fn write<T>(&self, label: String, f: impl FnOnce(&mut FakeState) -> Result<T>) -> Result<T> {
        if self.in_write.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.state().write_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let result = {
            let mut state = self.state();
            state.write_log.push(label);
            f(&mut state)
        };
        self.in_write.store(false, Ordering::SeqCst);
        result
    }
}

fn push_commit(state: &mut FakeState, message: &str) -> CommitId {
    let id = CommitId(format!("{:040x}", state.commits.len() + 1));
    let parent_ids = state.head.commit.iter().cloned().collect();
    state.commits.push(Commit {
        id: id.clone(),
        parent_ids,
        summary: message.to_string(),
        author: "Fake <fake@example.com>".into(),
        time: SystemTime::UNIX_EPOCH,
    });
    state.head.commit = Some(id.clone());
    id
}

fn move_flag(state: &mut FakeState, paths: &[&str], pairs: &[(StatusFlags, StatusFlags)]) {
    for entry in state
        .status
        .iter_mut()
        .filter(|entry| paths.contains(&entry.path.as_str()))
    {
        for (from, to) in pairs {
            if entry.flags.contains(*from) {
                entry.flags.remove(*from);
                entry.flags.insert(*to);
            }
        }
    }
}

impl GitRepository for FakeRepo {
    fn spec(&self) -> &RepoSpec {
        &self.spec
    }

    fn head(&self) -> Result<HeadState> {
        Ok(self.state().head.clone())
    }

    fn sha_for_ref(&self, reference: &str) -> Option<CommitId> {
        let state = self.state();
        if reference == "HEAD" {
            return state.head.commit.clone();
        }
        state
            .commits
            .iter()
            .find(|c| c.id.0 == reference)
            .map(|c| c.id.clone())
    }

    fn status(&self, _query: &StatusQuery) -> Result<Vec<StatusEntry>> {
        Ok(self.state().status.clone())
    }

    fn diff_unified(&self, target: &DiffTarget) -> Result<String> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_diff) {
            return Err(Error::new(ErrorKind::Backend("diff failed".into()))
                .with_args([target.path()]));
        }
        Ok(FAKE_DIFF.to_string())
    }

    fn changes_for_commit(
        &self,
        _commit: &CommitId,
        _parent: Option<&CommitId>,
    ) -> Result<Vec<FileChange>> {
        Ok(self.state().commit_changes.clone())
    }

    fn contents_of_staged_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(format!("staged {path}").into_bytes())
    }

    fn log_head_page(&self, limit: usize, cursor: Option<&LogCursor>) -> Result<LogPage> {
        self.log_page_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let newest_first = state.commits.iter().rev();
        let remaining = match cursor {
            Some(cursor) => newest_first
                .skip_while(|c| c.id != cursor.last_seen)
                .skip(1)
                .cloned()
                .collect::<Vec<_>>(),
            None => newest_first.cloned().collect(),
        };
        let commits = remaining.iter().take(limit).cloned().collect::<Vec<_>>();
        let next_cursor = (remaining.len() > commits.len())
            .then(|| commits.last())
            .flatten()
            .map(|c| LogCursor {
                last_seen: c.id.clone(),
            });
        Ok(LogPage {
            commits,
            next_cursor,
        })
    }

    fn list_branches(&self) -> Result<Vec<Branch>> {
        let state = self.state();
        let target = state.head.commit.clone().unwrap_or(CommitId(String::new()));
        Ok(state
            .branches
            .iter()
            .map(|name| Branch {
                name: name.clone(),
                target: target.clone(),
                is_head: state.head.branch.as_deref() == Some(name.as_str()),
            })
            .collect())
    }

    fn list_remote_branches(&self) -> Result<Vec<RemoteBranch>> {
        Ok(Vec::new())
    }

    fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(Vec::new())
    }

    fn list_remotes(&self) -> Result<Vec<Remote>> {
        Ok(Vec::new())
    }

    fn list_submodules(&self) -> Result<Vec<Submodule>> {
        Ok(Vec::new())
    }

    fn stash_list(&self) -> Result<Vec<StashEntry>> {
        Ok(Vec::new())
    }

    fn commit(&self, message: &str, amend: bool) -> Result<()> {
        self.write(format!("commit {message}"), |state| {
            if amend {
                state.head.commit = state.commits.pop().and_then(|c| c.parent_ids.first().cloned());
            }
            push_commit(state, message);
            for entry in &mut state.status {
                entry.flags.remove(
                    StatusFlags::INDEX_NEW | StatusFlags::INDEX_MODIFIED | StatusFlags::INDEX_DELETED,
                );
            }
            state.status.retain(|entry| !entry.flags.is_empty());
            Ok(())
        })
    }

    fn stage(&self, paths: &[&str]) -> Result<()> {
        self.write(format!("stage {}", paths.join(" ")), |state| {
            move_flag(
                state,
                paths,
                &[
                    (StatusFlags::WT_MODIFIED, StatusFlags::INDEX_MODIFIED),
                    (StatusFlags::WT_NEW, StatusFlags::INDEX_NEW),
                ],
            );
            Ok(())
        })
    }

    fn unstage(&self, paths: &[&str]) -> Result<()> {
        self.write(format!("unstage {}", paths.join(" ")), |state| {
            move_flag(
                state,
                paths,
                &[
                    (StatusFlags::INDEX_MODIFIED, StatusFlags::WT_MODIFIED),
                    (StatusFlags::INDEX_NEW, StatusFlags::WT_NEW),
                ],
            );
            Ok(())
        })
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.write(format!("checkout {name}"), |state| {
            if !state.branches.iter().any(|b| b == name) {
                return Err(Error::new(ErrorKind::RefNotFound).with_args([name]));
            }
            state.head.branch = Some(name.to_string());
            state.head.reference = Some(format!("refs/heads/{name}"));
            Ok(())
        })
    }

    fn apply_patch(&self, patch: &Patch, target: PatchTarget, reverse: bool) -> Result<()> {
        let label = format!("apply {target:?} reverse={reverse} {}", patch.path);
        self.write(label, |_| {
            if patch.text.is_empty() {
                return Err(Error::new(ErrorKind::PatchDidNotApply).with_args([patch.path.as_str()]));
            }
            Ok(())
        })
    }

    fn stash_pop(&self, index: usize) -> Result<()> {
        self.write(format!("stash pop {index}"), |state| {
            if state.stash_conflict {
                return Err(Error::new(ErrorKind::StashConflict));
            }
            Ok(())
        })
    }

    fn create_branch(&self, name: &str, _start_point: &str) -> Result<()> {
        self.write(format!("branch {name}"), |state| {
            state.branches.push(name.to_string());
            Ok(())
        })
    }
}
