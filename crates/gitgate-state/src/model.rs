use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of an open repository handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RepoId(pub u64);

impl RepoId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RepoId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

bitflags::bitflags! {
    /// Parts of a repository an operation or an on-disk event touched.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ChangeAreas: u8 {
        const INDEX = 1 << 0;
        const REFS = 1 << 1;
        const HEAD = 1 << 2;
        const WORKSPACE = 1 << 3;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepoEventKind {
    RepositoryChanged,
    IndexChanged,
    RefsChanged,
    HeadChanged,
    /// Affected repository-relative paths. Empty when the watcher could not tell.
    WorkspaceChanged { paths: Vec<String> },
}

impl RepoEventKind {
    pub fn area(&self) -> ChangeAreas {
        match self {
            RepoEventKind::RepositoryChanged => ChangeAreas::all(),
            RepoEventKind::IndexChanged => ChangeAreas::INDEX,
            RepoEventKind::RefsChanged => ChangeAreas::REFS,
            RepoEventKind::HeadChanged => ChangeAreas::HEAD,
            RepoEventKind::WorkspaceChanged { .. } => ChangeAreas::WORKSPACE,
        }
    }
}

/// A "please refresh" signal for one repository.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepoEvent {
    pub repo_id: RepoId,
    pub kind: RepoEventKind,
    /// Set when the change falls inside the window a write through this handle
    /// announced. Consumers may skip visible refresh work, never invalidation.
    pub expected: bool,
}
