use crate::gateway::RepositoryGateway;
use gitgate_core::change::{aggregate_folder, classify};
use gitgate_core::domain::{
    ChangeKind, CommitId, FileChange, WorkspaceFileStatus, normalize_repo_path,
};
use gitgate_core::services::{Result, StatusQuery};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock};

/// Path to (staged, unstaged) status, ordered by path.
pub type StatusMap = BTreeMap<String, WorkspaceFileStatus>;

/// One full workspace status reading.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StagingSnapshot {
    pub statuses: StatusMap,
    /// Rename destination to source.
    pub renamed_from: BTreeMap<String, String>,
}

impl StagingSnapshot {
    /// Staged renames are reported as source plus destination; worktree changes
    /// live on the destination file alone.
    fn changes_on(&self, staged: bool) -> Vec<FileChange> {
        let axis = |status: &WorkspaceFileStatus| {
            if staged { status.staged } else { status.unstaged }
        };
        self.statuses
            .iter()
            .filter(|(_, status)| axis(status) != ChangeKind::Unmodified)
            .map(|(path, status)| match self.renamed_from.get(path).filter(|_| staged) {
                Some(source) => FileChange {
                    path: source.clone(),
                    change: status.staged,
                    unstaged_change: status.unstaged,
                    destination: Some(path.clone()),
                },
                None => FileChange {
                    path: path.clone(),
                    change: status.staged,
                    unstaged_change: status.unstaged,
                    destination: None,
                },
            })
            .collect()
    }
}

/// The staged/unstaged file list behind the staging UI.
///
/// Every `reload` rebuilds the whole map from the repository; nothing is patched
/// in place.
pub struct StagingModel {
    gateway: Arc<RepositoryGateway>,
    query: RwLock<StatusQuery>,
    snapshot: RwLock<Arc<StagingSnapshot>>,
}

impl StagingModel {
    pub fn new(gateway: Arc<RepositoryGateway>) -> Self {
        Self {
            gateway,
            query: RwLock::new(StatusQuery::default()),
            snapshot: RwLock::new(Arc::default()),
        }
    }

    pub fn query(&self) -> StatusQuery {
        *self.query.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes effect on the next `reload`.
    pub fn set_query(&self, query: StatusQuery) {
        *self.query.write().unwrap_or_else(PoisonError::into_inner) = query;
    }

    pub fn reload(&self) -> Result<Arc<StagingSnapshot>> {
        let entries = self.gateway.status(&self.query())?;

        let mut snapshot = StagingSnapshot::default();
        for entry in entries {
            let path = normalize_repo_path(&entry.path);
            if let Some(orig) = entry.orig_path.as_deref() {
                snapshot
                    .renamed_from
                    .insert(path.clone(), normalize_repo_path(orig));
            }
            snapshot.statuses.insert(path, classify(entry.flags));
        }
        tracing::debug!(files = snapshot.statuses.len(), "reloaded workspace status");

        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// The snapshot from the last successful `reload`.
    pub fn snapshot(&self) -> Arc<StagingSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn status_map(&self) -> StatusMap {
        self.snapshot().statuses.clone()
    }

    pub fn status_of(&self, path: &str) -> Option<WorkspaceFileStatus> {
        self.snapshot()
            .statuses
            .get(&normalize_repo_path(path))
            .copied()
    }

    /// Files with something staged, sorted by path.
    pub fn staged_changes(&self) -> Vec<FileChange> {
        self.snapshot().changes_on(true)
    }

    /// Files with unstaged work, sorted by path.
    pub fn unstaged_changes(&self) -> Vec<FileChange> {
        self.snapshot().changes_on(false)
    }

    /// Files `commit` changed relative to `parent`, or to the empty tree when it
    /// has none. Sorted by path, case-sensitive.
    pub fn changes(&self, commit: &CommitId, parent: Option<&CommitId>) -> Result<Vec<FileChange>> {
        let mut changes = self.gateway.changes_for_commit(commit, parent)?;
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    /// Status of a directory for hierarchical display, aggregated per axis over
    /// every file below it. The empty path is the repository root.
    pub fn folder_status(&self, dir: &str) -> WorkspaceFileStatus {
        folder_status(&self.snapshot().statuses, dir)
    }
}

pub fn folder_status(statuses: &StatusMap, dir: &str) -> WorkspaceFileStatus {
    let dir = normalize_repo_path(dir);
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };
    WorkspaceFileStatus {
        staged: aggregate_folder(below(statuses, &prefix).map(|s| s.staged)),
        unstaged: aggregate_folder(below(statuses, &prefix).map(|s| s.unstaged)),
    }
}

fn below<'a>(
    statuses: &'a StatusMap,
    prefix: &'a str,
) -> impl Iterator<Item = WorkspaceFileStatus> + 'a {
    statuses
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(path, _)| path.starts_with(prefix))
        .map(|(_, status)| *status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::model::RepoId;
    use crate::notify::Notifier;
    use crate::test_support::FakeRepo;
    use gitgate_core::change::StatusFlags;
    use gitgate_core::services::StatusEntry;

    fn entry(path: &str, flags: StatusFlags) -> StatusEntry {
        StatusEntry {
            path: path.into(),
            flags,
            orig_path: None,
        }
    }

    fn model_with(entries: Vec<StatusEntry>) -> (Arc<FakeRepo>, StagingModel) {
        let repo = Arc::new(FakeRepo::new());
        repo.state().status = entries;
        let gateway = Arc::new(RepositoryGateway::new(
            RepoId(1),
            repo.clone(),
            &RepositoryConfig::default(),
            Arc::new(Notifier::default()),
        ));
        (repo, StagingModel::new(gateway))
    }

    #[test]
    fn reload_is_idempotent() {
        let (_repo, model) = model_with(vec![
            entry("b.txt", StatusFlags::WT_MODIFIED),
            entry("a.txt", StatusFlags::INDEX_NEW | StatusFlags::WT_DELETED),
        ]);
        let first = model.reload().unwrap();
        let second = model.reload().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            model.status_of("a.txt"),
            Some(WorkspaceFileStatus {
                staged: ChangeKind::Added,
                unstaged: ChangeKind::Deleted,
            })
        );
    }

    #[test]
    fn reload_rebuilds_instead_of_patching() {
        let (repo, model) = model_with(vec![entry("gone.txt", StatusFlags::WT_NEW)]);
        model.reload().unwrap();
        assert!(model.status_of("gone.txt").is_some());

        repo.state().status = vec![entry("new.txt", StatusFlags::WT_MODIFIED)];
        model.reload().unwrap();
        assert_eq!(model.status_of("gone.txt"), None);
        assert_eq!(model.status_map().len(), 1);
    }

    #[test]
    fn staged_and_unstaged_lists_are_split_and_sorted() {
        let mut renamed = entry("new/name.txt", StatusFlags::INDEX_RENAMED);
        renamed.orig_path = Some("old/name.txt".into());
        let (_repo, model) = model_with(vec![
            entry("z.txt", StatusFlags::INDEX_MODIFIED | StatusFlags::WT_MODIFIED),
            entry("b.txt", StatusFlags::WT_NEW),
            renamed,
            entry("a.txt", StatusFlags::INDEX_NEW),
        ]);
        model.reload().unwrap();

        let staged = model.staged_changes();
        assert_eq!(
            staged
                .iter()
                .map(|c| (c.path.as_str(), c.change))
                .collect::<Vec<_>>(),
            vec![
                ("a.txt", ChangeKind::Added),
                ("old/name.txt", ChangeKind::Renamed),
                ("z.txt", ChangeKind::Modified),
            ]
        );
        assert_eq!(staged[1].destination.as_deref(), Some("new/name.txt"));

        let unstaged = model.unstaged_changes();
        assert_eq!(
            unstaged
                .iter()
                .map(|c| (c.path.as_str(), c.unstaged_change))
                .collect::<Vec<_>>(),
            vec![("b.txt", ChangeKind::Untracked), ("z.txt", ChangeKind::Modified)]
        );
    }

    #[test]
    fn worktree_edits_to_a_staged_rename_are_listed_under_the_destination() {
        let mut renamed = entry(
            "new/name.txt",
            StatusFlags::INDEX_RENAMED | StatusFlags::WT_MODIFIED,
        );
        renamed.orig_path = Some("old/name.txt".into());
        let (_repo, model) = model_with(vec![renamed]);
        model.reload().unwrap();

        let staged = model.staged_changes();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path, "old/name.txt");
        assert_eq!(staged[0].destination.as_deref(), Some("new/name.txt"));

        let unstaged = model.unstaged_changes();
        assert_eq!(unstaged.len(), 1);
        assert_eq!(unstaged[0].path, "new/name.txt");
        assert_eq!(unstaged[0].unstaged_change, ChangeKind::Modified);
        assert_eq!(unstaged[0].destination, None);
    }

    #[test]
    fn folder_aggregation() {
        let mut statuses = StatusMap::new();
        let unstaged = |kind| WorkspaceFileStatus {
            staged: ChangeKind::Unmodified,
            unstaged: kind,
        };
        statuses.insert("mixed/a.txt".into(), unstaged(ChangeKind::Modified));
        statuses.insert("mixed/b.txt".into(), unstaged(ChangeKind::Added));
        statuses.insert("clean/a.txt".into(), unstaged(ChangeKind::Unmodified));
        statuses.insert("clean/b.txt".into(), unstaged(ChangeKind::Unmodified));
        statuses.insert("single/a.txt".into(), unstaged(ChangeKind::Deleted));
        statuses.insert("single-sibling.txt".into(), unstaged(ChangeKind::Added));

        assert_eq!(folder_status(&statuses, "mixed").unstaged, ChangeKind::Mixed);
        assert_eq!(
            folder_status(&statuses, "clean/").unstaged,
            ChangeKind::Unmodified
        );
        assert_eq!(
            folder_status(&statuses, "single").unstaged,
            ChangeKind::Deleted
        );
        assert_eq!(folder_status(&statuses, "").unstaged, ChangeKind::Mixed);
        assert_eq!(folder_status(&statuses, "").staged, ChangeKind::Unmodified);
        assert_eq!(
            folder_status(&statuses, "missing"),
            WorkspaceFileStatus::default()
        );
    }

    #[test]
    fn commit_changes_are_sorted_by_path() {
        let (repo, model) = model_with(Vec::new());
        repo.state().commit_changes = vec![
            FileChange::new("b.txt", ChangeKind::Modified),
            FileChange::new("B.txt", ChangeKind::Added),
            FileChange::new("a/c.txt", ChangeKind::Deleted),
        ];
        let changes = model
            .changes(&CommitId("c".repeat(40)), None)
            .unwrap()
            .into_iter()
            .map(|c| c.path)
            .collect::<Vec<_>>();
        assert_eq!(changes, vec!["B.txt", "a/c.txt", "b.txt"]);
    }
}
