use gitgate_core::change::{StatusFlags, classify};
use gitgate_core::diff::{DiffResult, LineKind};
use gitgate_core::domain::*;
use rustc_hash::FxHashSet;

#[test]
fn diff_targets_are_hashable_keys() {
    let mut set = FxHashSet::default();
    set.insert(DiffTarget::Staged {
        path: "a.txt".into(),
    });
    set.insert(DiffTarget::Unstaged {
        path: "a.txt".into(),
    });
    set.insert(DiffTarget::Commit {
        path: "a.txt".into(),
        commit: CommitId("b".into()),
        parent: None,
    });
    assert_eq!(set.len(), 3);
    assert!(set.contains(&DiffTarget::Staged {
        path: "a.txt".into()
    }));
}

#[test]
fn file_change_paths_are_normalized() {
    let change = FileChange::new("./src//main.rs", ChangeKind::Modified);
    assert_eq!(change.path, "src/main.rs");
    assert_eq!(change.unstaged_change, ChangeKind::Unmodified);
}

#[test]
fn staged_add_then_worktree_delete_keeps_both_facts() {
    let status = classify(StatusFlags::INDEX_NEW | StatusFlags::WT_DELETED);
    assert_eq!(
        status,
        WorkspaceFileStatus {
            staged: ChangeKind::Added,
            unstaged: ChangeKind::Deleted,
        }
    );
}

#[test]
fn diff_from_git_output_classifies_lines() {
    let text = "\
diff --git a/a.txt b/a.txt
index 0000000..1111111 100644
--- a/a.txt
+++ b/a.txt
@@ -1,2 +1,2 @@
+hello
 world
-bye
";
    let diff = DiffResult::parse_unified("a.txt", text);
    let kinds = diff.hunks[0].lines.iter().map(|l| l.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![LineKind::Addition, LineKind::Context, LineKind::Deletion]
    );
}
