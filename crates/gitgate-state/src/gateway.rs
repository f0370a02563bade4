use crate::cache::DiffCache;
use crate::command::RepoCommand;
use crate::config::RepositoryConfig;
use crate::gate::WriteGate;
use crate::handle::repo_monitor::WatchChange;
use crate::model::{ChangeAreas, RepoId};
use crate::notify::{ExpectedChanges, Notifier, events_for};
use gitgate_core::diff::{DiffResult, Patch};
use gitgate_core::domain::*;
use gitgate_core::error::ErrorKind;
use gitgate_core::services::{GitRepository, Result, StatusEntry, StatusQuery};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct HeadCache {
    state: Option<HeadState>,
    generation: u64,
}

/// Single point of entry for repository mutation, and for reads that must stay
/// consistent with in-flight writes.
///
/// Writes run one at a time in submission order. Each one flushes the diff cache,
/// drops the cached HEAD and, when it changed something, notifies subscribers
/// before the next write starts.
pub struct RepositoryGateway {
    repo_id: RepoId,
    repo: Arc<dyn GitRepository>,
    gate: WriteGate,
    diffs: DiffCache,
    head: Mutex<HeadCache>,
    notifier: Arc<Notifier>,
    expected: ExpectedChanges,
    expected_window: Duration,
}

impl RepositoryGateway {
    pub fn new(
        repo_id: RepoId,
        repo: Arc<dyn GitRepository>,
        config: &RepositoryConfig,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            repo_id,
            repo,
            gate: WriteGate::new(),
            diffs: DiffCache::new(config.diff_cache_capacity),
            head: Mutex::new(HeadCache::default()),
            notifier,
            expected: ExpectedChanges::default(),
            expected_window: config.watch.expected_change_window,
        }
    }

    pub fn repo_id(&self) -> RepoId {
        self.repo_id
    }

    pub fn spec(&self) -> &RepoSpec {
        self.repo.spec()
    }

    pub fn repository(&self) -> &Arc<dyn GitRepository> {
        &self.repo
    }

    pub fn diff_cache(&self) -> &DiffCache {
        &self.diffs
    }

    /// For busy indicators only; ordering is guaranteed by the queue, not this flag.
    pub fn is_writing(&self) -> bool {
        self.gate.is_writing()
    }

    pub fn queued_writes(&self) -> usize {
        self.gate.queued()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.gate.is_shutting_down()
    }

    /// Rejects further writes and waits for accepted ones to finish. Idempotent.
    /// Rejects new writes; accepted ones still run.
    pub fn close(&self) {
        self.gate.close();
    }

    pub fn shut_down(&self) {
        self.gate.shut_down();
    }

    /// Runs `command` after every earlier write.
    pub fn execute(&self, command: &RepoCommand) -> Result<()> {
        self.run_write(command, true)
    }

    /// Runs `command` only if no other write is in flight or queued, failing with
    /// `WriteLockUnavailable` otherwise.
    pub fn try_execute(&self, command: &RepoCommand) -> Result<()> {
        self.run_write(command, false)
    }

    fn run_write(&self, command: &RepoCommand, wait: bool) -> Result<()> {
        let operation = command.operation();
        let areas = command.areas();
        let write = || {
            let started = Instant::now();
            self.expected.mark(areas, self.expected_window, started);
            self.invalidate_head();

            let result = command.apply(self.repo.as_ref());

            // A failed command may still have touched the disk.
            self.diffs.flush();
            self.invalidate_head();
            self.expected
                .mark(areas, self.expected_window, Instant::now());

            match &result {
                Ok(()) => {
                    tracing::debug!(
                        operation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "write finished"
                    );
                    self.announce(areas, command.workspace_paths());
                }
                // Conflicted reapplication leaves the tree changed.
                Err(e) if e.kind() == &ErrorKind::StashConflict => {
                    self.announce(areas, command.workspace_paths());
                }
                Err(e) => tracing::debug!(operation, error = %e, "write failed"),
            }
            result
        };

        let result = if wait {
            self.gate.run(write)
        } else {
            self.gate.try_run(write)
        };
        result.map_err(|e| e.in_operation(operation))
    }

    fn announce(&self, areas: ChangeAreas, paths: Vec<String>) {
        self.notifier
            .send_all(events_for(self.repo_id, areas, paths, |_| false));
    }

    pub fn commit(&self, message: &str, amend: bool) -> Result<()> {
        self.execute(&RepoCommand::Commit {
            message: message.to_string(),
            amend,
        })
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.execute(&RepoCommand::Checkout {
            branch: branch.to_string(),
        })
    }

    pub fn stage_patch(&self, patch: &Patch) -> Result<()> {
        self.execute(&RepoCommand::StagePatch(patch.clone()))
    }

    pub fn unstage_patch(&self, patch: &Patch) -> Result<()> {
        self.execute(&RepoCommand::UnstagePatch(patch.clone()))
    }

    pub fn discard_patch(&self, patch: &Patch) -> Result<()> {
        self.execute(&RepoCommand::DiscardPatch(patch.clone()))
    }

    pub fn stage_files(&self, paths: &[&str]) -> Result<()> {
        self.execute(&RepoCommand::StageFiles {
            paths: owned(paths),
        })
    }

    pub fn unstage_files(&self, paths: &[&str]) -> Result<()> {
        self.execute(&RepoCommand::UnstageFiles {
            paths: owned(paths),
        })
    }

    pub fn discard_files(&self, paths: &[&str]) -> Result<()> {
        self.execute(&RepoCommand::DiscardFiles {
            paths: owned(paths),
        })
    }

    pub fn save_stash(&self, message: Option<&str>, include_untracked: bool) -> Result<()> {
        self.execute(&RepoCommand::SaveStash {
            message: message.map(str::to_string),
            include_untracked,
        })
    }

    pub fn pop_stash(&self, index: usize) -> Result<()> {
        self.execute(&RepoCommand::PopStash { index })
    }

    pub fn apply_stash(&self, index: usize) -> Result<()> {
        self.execute(&RepoCommand::ApplyStash { index })
    }

    pub fn drop_stash(&self, index: usize) -> Result<()> {
        self.execute(&RepoCommand::DropStash { index })
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.execute(&RepoCommand::AddRemote {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    pub fn delete_remote(&self, name: &str) -> Result<()> {
        self.execute(&RepoCommand::DeleteRemote {
            name: name.to_string(),
        })
    }

    pub fn rename_remote(&self, old: &str, new: &str) -> Result<()> {
        self.execute(&RepoCommand::RenameRemote {
            old: old.to_string(),
            new: new.to_string(),
        })
    }

    pub fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.execute(&RepoCommand::CreateBranch {
            name: name.to_string(),
            start_point: start_point.to_string(),
        })
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.execute(&RepoCommand::DeleteBranch {
            name: name.to_string(),
        })
    }

    pub fn rename_branch(&self, old: &str, new: &str) -> Result<()> {
        self.execute(&RepoCommand::RenameBranch {
            old: old.to_string(),
            new: new.to_string(),
        })
    }

    pub fn create_tag(&self, name: &str, target: &str, message: Option<&str>) -> Result<()> {
        self.execute(&RepoCommand::CreateTag {
            name: name.to_string(),
            target: target.to_string(),
            message: message.map(str::to_string),
        })
    }

    pub fn delete_tag(&self, name: &str) -> Result<()> {
        self.execute(&RepoCommand::DeleteTag {
            name: name.to_string(),
        })
    }

    fn lock_head(&self) -> MutexGuard<'_, HeadCache> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn invalidate_head(&self) {
        let mut cache = self.lock_head();
        cache.state = None;
        cache.generation += 1;
    }

    /// Cached HEAD. While a write is in flight this waits for it, so torn state
    /// from the middle of a write is never cached or returned from the cache.
    pub fn head(&self) -> Result<HeadState> {
        self.gate.wait_idle();
        let generation = {
            let cache = self.lock_head();
            if let Some(state) = &cache.state {
                return Ok(state.clone());
            }
            cache.generation
        };

        let head = self.repo.head().map_err(|e| e.in_operation("read HEAD"))?;

        let mut cache = self.lock_head();
        if cache.generation == generation && !self.gate.is_writing() {
            cache.state = Some(head.clone());
        }
        Ok(head)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.head()?.branch)
    }

    /// Never fails; unresolvable input yields `None`.
    pub fn sha_for_ref(&self, reference: &str) -> Option<CommitId> {
        self.repo.sha_for_ref(reference)
    }

    pub fn contents_of_file(&self, path: &str, commit: &CommitId) -> Result<Vec<u8>> {
        self.repo
            .contents_of_file(path, commit)
            .map_err(|e| e.in_operation("read file at commit"))
    }

    pub fn contents_of_staged_file(&self, path: &str) -> Result<Vec<u8>> {
        self.repo
            .contents_of_staged_file(path)
            .map_err(|e| e.in_operation("read staged file"))
    }

    /// Parsed diff for `target`, computed at most once until the next write or
    /// external change.
    pub fn diff(&self, target: &DiffTarget) -> Result<Arc<DiffResult>> {
        self.diffs
            .compute_and_store(target, || {
                let text = self.repo.diff_unified(target)?;
                Ok(DiffResult::parse_unified(target.path(), &text))
            })
            .map_err(|e| e.in_operation("diff"))
    }

    pub fn cached_diff(&self, target: &DiffTarget) -> Option<Arc<DiffResult>> {
        self.diffs.get(target)
    }

    pub fn status(&self, query: &StatusQuery) -> Result<Vec<StatusEntry>> {
        self.repo
            .status(query)
            .map_err(|e| e.in_operation("status"))
    }

    pub fn changes_for_commit(
        &self,
        commit: &CommitId,
        parent: Option<&CommitId>,
    ) -> Result<Vec<FileChange>> {
        self.repo
            .changes_for_commit(commit, parent)
            .map_err(|e| e.in_operation("list commit changes"))
    }

    pub fn log_page(&self, limit: usize, cursor: Option<&LogCursor>) -> Result<LogPage> {
        self.repo
            .log_head_page(limit, cursor)
            .map_err(|e| e.in_operation("log"))
    }

    pub fn branches(&self) -> Result<Vec<Branch>> {
        self.repo
            .list_branches()
            .map_err(|e| e.in_operation("list branches"))
    }

    pub fn remote_branches(&self) -> Result<Vec<RemoteBranch>> {
        self.repo
            .list_remote_branches()
            .map_err(|e| e.in_operation("list remote branches"))
    }

    pub fn tags(&self) -> Result<Vec<Tag>> {
        self.repo
            .list_tags()
            .map_err(|e| e.in_operation("list tags"))
    }

    pub fn remotes(&self) -> Result<Vec<Remote>> {
        self.repo
            .list_remotes()
            .map_err(|e| e.in_operation("list remotes"))
    }

    pub fn stashes(&self) -> Result<Vec<StashEntry>> {
        self.repo
            .stash_list()
            .map_err(|e| e.in_operation("list stashes"))
    }

    pub fn submodules(&self) -> Result<Vec<Submodule>> {
        self.repo
            .list_submodules()
            .map_err(|e| e.in_operation("list submodules"))
    }

    /// The sidebar tree: branches, remotes, remote branches and tags always;
    /// stashes and submodules when there are any.
    pub fn sidebar_items(&self) -> Result<Vec<SidebarItem>> {
        let branches = self
            .branches()?
            .into_iter()
            .map(|b| SidebarItem::Branch {
                name: b.name,
                is_head: b.is_head,
            })
            .collect();
        let remotes = self
            .remotes()?
            .into_iter()
            .map(|r| SidebarItem::Remote {
                name: r.name,
                url: r.url,
            })
            .collect();
        let remote_branches = self
            .remote_branches()?
            .into_iter()
            .map(|b| SidebarItem::RemoteBranch {
                remote: b.remote,
                name: b.name,
            })
            .collect();
        let tags = self
            .tags()?
            .into_iter()
            .map(|t| SidebarItem::Tag {
                name: t.name,
                target: t.target,
            })
            .collect();
        let stashes = self
            .stashes()?
            .into_iter()
            .map(|s| SidebarItem::Stash {
                index: s.index,
                message: s.message,
            })
            .collect::<Vec<_>>();
        let submodules = self
            .submodules()?
            .into_iter()
            .map(|s| SidebarItem::Submodule { path: s.path })
            .collect::<Vec<_>>();

        let mut items = vec![
            group("Branches", branches),
            group("Remotes", remotes),
            group("Remote Branches", remote_branches),
            group("Tags", tags),
        ];
        if !stashes.is_empty() {
            items.push(group("Stashes", stashes));
        }
        if !submodules.is_empty() {
            items.push(group("Submodules", submodules));
        }
        Ok(items)
    }

    /// Folds a debounced watcher batch into the caches and notifies subscribers.
    /// `last_head` is the HEAD the watcher saw previously.
    pub(crate) fn reconcile_external_change(
        &self,
        change: WatchChange,
        last_head: &mut Option<HeadState>,
    ) {
        let now = Instant::now();
        let mut areas = change.areas;
        if areas.intersects(ChangeAreas::INDEX | ChangeAreas::WORKSPACE) {
            self.diffs.flush();
        }
        if areas.contains(ChangeAreas::REFS) {
            self.invalidate_head();
            let head = self.head().ok();
            if head != *last_head {
                // Staged diffs compare against HEAD.
                self.diffs.flush();
                areas |= ChangeAreas::HEAD;
                *last_head = head;
            }
        }
        let events = events_for(self.repo_id, areas, change.into_paths(), |area| {
            self.expected.is_expected(area, now)
        });
        self.notifier.send_all(events);
    }
}

fn owned(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| normalize_repo_path(p)).collect()
}

fn group(title: &str, children: Vec<SidebarItem>) -> SidebarItem {
    SidebarItem::Group {
        title: title.to_string(),
        children,
    }
}
