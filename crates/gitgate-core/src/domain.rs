use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RepoSpec {
    pub workdir: PathBuf,
    pub git_dir: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Commit {
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub summary: String,
    pub author: String,
    pub time: SystemTime,
}

/// Where HEAD points. `branch` is `None` when detached, `commit` is `None` on an unborn branch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeadState {
    pub reference: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<CommitId>,
}

/// Status of one path on one axis (staged or unstaged).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    #[default]
    Unmodified,
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Ignored,
    Untracked,
    TypeChanged,
    Unreadable,
    Conflicted,
    /// Folder whose descendants disagree.
    Mixed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileChange {
    /// Repository relative, `/` separated.
    pub path: String,
    pub change: ChangeKind,
    pub unstaged_change: ChangeKind,
    pub destination: Option<String>,
}

impl FileChange {
    pub fn new(path: impl AsRef<str>, change: ChangeKind) -> Self {
        Self {
            path: normalize_repo_path(path.as_ref()),
            change,
            unstaged_change: ChangeKind::Unmodified,
            destination: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct WorkspaceFileStatus {
    pub staged: ChangeKind,
    pub unstaged: ChangeKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DiffTarget {
    /// `path` as changed by `commit`, relative to `parent` or the empty tree.
    Commit {
        path: String,
        commit: CommitId,
        parent: Option<CommitId>,
    },
    Staged {
        path: String,
    },
    Unstaged {
        path: String,
    },
}

impl DiffTarget {
    pub fn path(&self) -> &str {
        match self {
            DiffTarget::Commit { path, .. }
            | DiffTarget::Staged { path }
            | DiffTarget::Unstaged { path } => path,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Branch {
    pub name: String,
    pub target: CommitId,
    pub is_head: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag {
    pub name: String,
    pub target: CommitId,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Remote {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteBranch {
    pub remote: String,
    pub name: String,
    pub target: CommitId,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StashEntry {
    pub index: usize,
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submodule {
    pub path: String,
    pub commit: Option<CommitId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogCursor {
    pub last_seen: CommitId,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogPage {
    pub commits: Vec<Commit>,
    pub next_cursor: Option<LogCursor>,
}

/// One row of the repository sidebar.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SidebarItem {
    Branch { name: String, is_head: bool },
    RemoteBranch { remote: String, name: String },
    Tag { name: String, target: CommitId },
    Remote { name: String, url: Option<String> },
    Stash { index: usize, message: String },
    Submodule { path: String },
    Group { title: String, children: Vec<SidebarItem> },
}

impl SidebarItem {
    pub fn title(&self) -> &str {
        match self {
            SidebarItem::Branch { name, .. }
            | SidebarItem::RemoteBranch { name, .. }
            | SidebarItem::Tag { name, .. }
            | SidebarItem::Remote { name, .. } => name,
            SidebarItem::Stash { message, .. } => message,
            SidebarItem::Submodule { path } => path,
            SidebarItem::Group { title, .. } => title,
        }
    }
}

/// Normalizes a repository path: `/` separators, no `./` segments, no leading
/// or trailing slash, no repeated separators.
pub fn normalize_repo_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut out = String::with_capacity(path.len());
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}
