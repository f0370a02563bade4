use gitgate_core::change::{StatusFlags, classify};
use gitgate_core::diff::DiffResult;
use gitgate_core::domain::{ChangeKind, CommitId, DiffTarget, WorkspaceFileStatus};
use gitgate_core::services::{GitBackend, GitRepository, StatusQuery};
use gitgate_git_gix::GixBackend;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

fn run_git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .status()
        .expect("git command to run");
    assert!(status.success(), "git {:?} failed", args);
}

fn write(repo: &Path, rel: &str, contents: &str) {
    let path = repo.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
}

fn init_repo(repo: &Path) {
    run_git(repo, &["init", "-q"]);
    run_git(repo, &["config", "user.email", "you@example.com"]);
    run_git(repo, &["config", "user.name", "You"]);
    run_git(repo, &["config", "commit.gpgsign", "false"]);
}

fn commit_all(repo: &Path, message: &str) {
    run_git(repo, &["add", "-A"]);
    run_git(repo, &["-c", "commit.gpgsign=false", "commit", "-q", "-m", message]);
}

fn open(repo: &Path) -> Arc<dyn GitRepository> {
    GixBackend::default().open(repo).unwrap()
}

fn status_of(repo: &dyn GitRepository, path: &str, query: StatusQuery) -> Option<WorkspaceFileStatus> {
    repo.status(&query)
        .unwrap()
        .into_iter()
        .find(|e| e.path == path)
        .map(|e| classify(e.flags))
}

#[test]
fn status_separates_staged_and_unstaged() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);

    write(repo, "a.txt", "one\n");
    commit_all(repo, "init");

    write(repo, "a.txt", "one\ntwo\n");
    run_git(repo, &["add", "a.txt"]);
    write(repo, "b.txt", "untracked\n");

    let opened = open(repo);
    let entries = opened.status(&StatusQuery::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "a.txt");
    assert_eq!(entries[0].flags, StatusFlags::INDEX_MODIFIED);
    assert_eq!(entries[1].path, "b.txt");
    assert_eq!(entries[1].flags, StatusFlags::WT_NEW);
}

#[test]
fn staged_add_then_worktree_delete_reports_both() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "a.txt", "x\n");
    commit_all(repo, "init");

    write(repo, "new.txt", "fresh\n");
    run_git(repo, &["add", "new.txt"]);
    fs::remove_file(repo.join("new.txt")).unwrap();

    let opened = open(repo);
    assert_eq!(
        status_of(opened.as_ref(), "new.txt", StatusQuery::default()),
        Some(WorkspaceFileStatus {
            staged: ChangeKind::Added,
            unstaged: ChangeKind::Deleted,
        })
    );
}

#[test]
fn status_query_options_add_clean_and_ignored_files() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, ".gitignore", "*.log\n");
    write(repo, "clean.txt", "clean\n");
    commit_all(repo, "init");
    write(repo, "debug.log", "noise\n");

    let opened = open(repo);
    assert_eq!(
        status_of(opened.as_ref(), "clean.txt", StatusQuery::default()),
        None
    );
    assert_eq!(
        status_of(opened.as_ref(), "debug.log", StatusQuery::default()),
        None
    );

    let all = StatusQuery {
        include_unmodified: true,
        include_ignored: true,
    };
    assert_eq!(
        status_of(opened.as_ref(), "clean.txt", all),
        Some(WorkspaceFileStatus::default())
    );
    assert_eq!(
        status_of(opened.as_ref(), "debug.log", all).map(|s| s.unstaged),
        Some(ChangeKind::Ignored)
    );
}

#[test]
fn diff_unified_works_for_staged_unstaged_and_untracked() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "a.txt", "one\n");
    commit_all(repo, "init");

    write(repo, "a.txt", "one\ntwo\n");
    write(repo, "new.txt", "hello\n");
    let opened = open(repo);

    let unstaged = opened
        .diff_unified(&DiffTarget::Unstaged {
            path: "a.txt".into(),
        })
        .unwrap();
    let parsed = DiffResult::parse_unified("a.txt", &unstaged);
    assert_eq!(parsed.hunks.len(), 1);
    assert_eq!(parsed.additions(), 1);

    let untracked = opened
        .diff_unified(&DiffTarget::Unstaged {
            path: "new.txt".into(),
        })
        .unwrap();
    let parsed = DiffResult::parse_unified("new.txt", &untracked);
    assert_eq!(parsed.additions(), 1);
    assert_eq!(parsed.hunks[0].lines[0].text, "hello");

    run_git(repo, &["add", "a.txt"]);
    let staged = opened
        .diff_unified(&DiffTarget::Staged {
            path: "a.txt".into(),
        })
        .unwrap();
    assert!(staged.contains("@@"));
    let unstaged = opened
        .diff_unified(&DiffTarget::Unstaged {
            path: "a.txt".into(),
        })
        .unwrap();
    assert!(unstaged.is_empty());
}

#[test]
fn changes_for_commit_against_parent_and_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "b.txt", "b\n");
    write(repo, "a.txt", "a\n");
    commit_all(repo, "init");

    write(repo, "a.txt", "a2\n");
    write(repo, "c.txt", "c\n");
    commit_all(repo, "second");

    let opened = open(repo);
    let head = opened.sha_for_ref("HEAD").unwrap();
    let parent = opened.sha_for_ref("HEAD~1").unwrap();

    let root = opened.changes_for_commit(&parent, None).unwrap();
    assert_eq!(
        root.iter()
            .map(|c| (c.path.as_str(), c.change))
            .collect::<Vec<_>>(),
        vec![("a.txt", ChangeKind::Added), ("b.txt", ChangeKind::Added)]
    );

    let changes = opened.changes_for_commit(&head, Some(&parent)).unwrap();
    assert_eq!(
        changes
            .iter()
            .map(|c| (c.path.as_str(), c.change))
            .collect::<Vec<_>>(),
        vec![("a.txt", ChangeKind::Modified), ("c.txt", ChangeKind::Added)]
    );

    let diff = opened
        .diff_unified(&DiffTarget::Commit {
            path: "a.txt".into(),
            commit: head,
            parent: Some(parent),
        })
        .unwrap();
    let parsed = DiffResult::parse_unified("a.txt", &diff);
    assert_eq!((parsed.additions(), parsed.deletions()), (1, 1));
}

#[test]
fn sha_for_ref_never_fails() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    let opened = open(repo);
    // Unborn HEAD.
    assert_eq!(opened.sha_for_ref("HEAD"), None);

    write(repo, "a.txt", "a\n");
    commit_all(repo, "init");
    assert!(opened.sha_for_ref("HEAD").is_some());
    assert_eq!(opened.sha_for_ref("no-such-branch"), None);
    assert_eq!(opened.sha_for_ref(""), None);
    assert_eq!(
        opened.sha_for_ref(&"0".repeat(40)),
        None::<CommitId>
    );
}

#[test]
fn contents_at_commit_and_in_index() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "a.txt", "x\n");
    commit_all(repo, "init");
    write(repo, "a.txt", "y\n");
    run_git(repo, &["add", "a.txt"]);

    let opened = open(repo);
    let head = opened.sha_for_ref("HEAD").unwrap();
    assert_eq!(opened.contents_of_file("a.txt", &head).unwrap(), b"x\n");
    assert_eq!(opened.contents_of_staged_file("a.txt").unwrap(), b"y\n");
}

#[cfg(unix)]
#[test]
fn unreadable_workspace_file_is_flagged() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "a.txt", "a\n");
    commit_all(repo, "init");

    write(repo, "secret.txt", "hidden\n");
    let secret = repo.join("secret.txt");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&secret).is_ok() {
        // Privileged users can read the file regardless of its mode.
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let opened = open(repo);
    let entries = opened.status(&StatusQuery::default()).unwrap();
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

    let entry = entries.iter().find(|e| e.path == "secret.txt").unwrap();
    assert!(entry.flags.contains(StatusFlags::WT_UNREADABLE));
    assert_eq!(classify(entry.flags).unstaged, ChangeKind::Unreadable);
}

#[test]
fn status_reports_conflicts_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    write(repo, "a.txt", "base\n");
    commit_all(repo, "init");
    run_git(repo, &["branch", "-M", "main"]);

    run_git(repo, &["checkout", "-q", "-b", "other"]);
    write(repo, "a.txt", "theirs\n");
    commit_all(repo, "theirs");
    run_git(repo, &["checkout", "-q", "main"]);
    write(repo, "a.txt", "ours\n");
    commit_all(repo, "ours");

    let merge = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["merge", "-q", "other"])
        .output()
        .unwrap();
    assert!(!merge.status.success());

    let opened = open(repo);
    let entries = opened.status(&StatusQuery::default()).unwrap();
    let conflicted = entries
        .iter()
        .filter(|e| e.path == "a.txt")
        .collect::<Vec<_>>();
    assert_eq!(conflicted.len(), 1);
    assert_eq!(conflicted[0].flags, StatusFlags::CONFLICTED);
}
