use crate::domain::{ChangeKind, WorkspaceFileStatus};

bitflags::bitflags! {
    /// Raw per-path status bits as reported by a status query.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct StatusFlags: u32 {
        const INDEX_NEW = 1 << 0;
        const INDEX_MODIFIED = 1 << 1;
        const INDEX_DELETED = 1 << 2;
        const INDEX_RENAMED = 1 << 3;
        const INDEX_COPIED = 1 << 4;
        const INDEX_TYPECHANGE = 1 << 5;

        const WT_NEW = 1 << 7;
        const WT_MODIFIED = 1 << 8;
        const WT_DELETED = 1 << 9;
        const WT_RENAMED = 1 << 10;
        const WT_TYPECHANGE = 1 << 11;
        const WT_UNREADABLE = 1 << 12;

        const IGNORED = 1 << 14;
        const CONFLICTED = 1 << 15;
    }
}

/// Maps status bits onto the (staged, unstaged) pair.
///
/// The axes are independent: a file added to the index and then removed from the
/// working tree is `(Added, Deleted)`. `CONFLICTED` wins on both axes.
pub fn classify(flags: StatusFlags) -> WorkspaceFileStatus {
    WorkspaceFileStatus {
        staged: classify_staged(flags),
        unstaged: classify_unstaged(flags),
    }
}

pub fn classify_staged(flags: StatusFlags) -> ChangeKind {
    if flags.contains(StatusFlags::CONFLICTED) {
        ChangeKind::Conflicted
    } else if flags.contains(StatusFlags::INDEX_NEW) {
        ChangeKind::Added
    } else if flags.contains(StatusFlags::INDEX_DELETED) {
        ChangeKind::Deleted
    } else if flags.contains(StatusFlags::INDEX_RENAMED) {
        ChangeKind::Renamed
    } else if flags.contains(StatusFlags::INDEX_COPIED) {
        ChangeKind::Copied
    } else if flags.contains(StatusFlags::INDEX_TYPECHANGE) {
        ChangeKind::TypeChanged
    } else if flags.contains(StatusFlags::INDEX_MODIFIED) {
        ChangeKind::Modified
    } else {
        ChangeKind::Unmodified
    }
}

pub fn classify_unstaged(flags: StatusFlags) -> ChangeKind {
    if flags.contains(StatusFlags::CONFLICTED) {
        ChangeKind::Conflicted
    } else if flags.contains(StatusFlags::WT_UNREADABLE) {
        ChangeKind::Unreadable
    } else if flags.contains(StatusFlags::WT_NEW) {
        ChangeKind::Untracked
    } else if flags.contains(StatusFlags::WT_DELETED) {
        ChangeKind::Deleted
    } else if flags.contains(StatusFlags::WT_RENAMED) {
        ChangeKind::Renamed
    } else if flags.contains(StatusFlags::WT_TYPECHANGE) {
        ChangeKind::TypeChanged
    } else if flags.contains(StatusFlags::WT_MODIFIED) {
        ChangeKind::Modified
    } else if flags.contains(StatusFlags::IGNORED) {
        ChangeKind::Ignored
    } else {
        ChangeKind::Unmodified
    }
}

/// Folder status for hierarchical display.
///
/// `Unmodified` if every descendant is unmodified (or there are none), the single
/// common kind if all changed descendants agree, `Mixed` otherwise.
pub fn aggregate_folder<I>(kinds: I) -> ChangeKind
where
    I: IntoIterator<Item = ChangeKind>,
{
    let mut common: Option<ChangeKind> = None;
    for kind in kinds {
        if kind == ChangeKind::Unmodified {
            continue;
        }
        match common {
            None => common = Some(kind),
            Some(existing) if existing == kind => {}
            Some(_) => return ChangeKind::Mixed,
        }
    }
    common.unwrap_or(ChangeKind::Unmodified)
}

/// Maps a single-letter status as printed by `git diff --name-status` or the
/// porcelain formats.
pub fn kind_from_status_letter(letter: char) -> Option<ChangeKind> {
    Some(match letter {
        'A' => ChangeKind::Added,
        'M' => ChangeKind::Modified,
        'D' => ChangeKind::Deleted,
        'R' => ChangeKind::Renamed,
        'C' => ChangeKind::Copied,
        'T' => ChangeKind::TypeChanged,
        'U' => ChangeKind::Conflicted,
        '?' => ChangeKind::Untracked,
        '!' => ChangeKind::Ignored,
        '.' | ' ' => ChangeKind::Unmodified,
        _ => return None,
    })
}
