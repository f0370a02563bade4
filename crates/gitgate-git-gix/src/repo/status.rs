use super::{GixRepo, backend_error};
use gitgate_core::change::StatusFlags;
use gitgate_core::services::{Result, StatusEntry, StatusQuery};
use gix::bstr::ByteSlice as _;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;

#[derive(Default)]
struct Accumulated {
    flags: StatusFlags,
    orig_path: Option<String>,
}

impl GixRepo {
    pub(super) fn status_impl(&self, query: &StatusQuery) -> Result<Vec<StatusEntry>> {
        let repo = self.repo.to_thread_local();
        let mut platform = repo
            .status(gix::progress::Discard)
            .map_err(|e| backend_error("gix status platform", e))?
            .untracked_files(gix::status::UntrackedFiles::Files);
        if query.include_ignored {
            platform = platform.index_worktree_options_mut(|opts| {
                opts.dirwalk_options = opts
                    .dirwalk_options
                    .take()
                    .map(|walk| walk.emit_ignored(Some(gix::dir::walk::EmissionMode::Matching)));
            });
        }

        let iter = platform
            .into_iter(std::iter::empty::<gix::bstr::BString>())
            .map_err(|e| backend_error("gix status iter", e))?;

        let mut by_path: FxHashMap<String, Accumulated> = FxHashMap::default();
        for item in iter {
            let item = item.map_err(|e| backend_error("gix status item", e))?;
            match item {
                gix::status::Item::IndexWorktree(item) => match item {
                    gix::status::index_worktree::Item::Modification {
                        rela_path, status, ..
                    } => {
                        let Some(flags) = worktree_flags(status) else {
                            continue;
                        };
                        by_path
                            .entry(rela_path.to_str_lossy().into_owned())
                            .or_default()
                            .flags |= flags;
                    }
                    gix::status::index_worktree::Item::DirectoryContents { entry, .. } => {
                        let flags = match entry.status {
                            gix::dir::entry::Status::Untracked => StatusFlags::WT_NEW,
                            gix::dir::entry::Status::Ignored(_) => StatusFlags::IGNORED,
                            gix::dir::entry::Status::Tracked => StatusFlags::WT_MODIFIED,
                            gix::dir::entry::Status::Pruned => continue,
                        };
                        by_path
                            .entry(entry.rela_path.to_str_lossy().into_owned())
                            .or_default()
                            .flags |= flags;
                    }
                    gix::status::index_worktree::Item::Rewrite {
                        source,
                        dirwalk_entry,
                        copy,
                        ..
                    } => {
                        // The index only knows the source; the destination is a new file.
                        if !copy {
                            by_path
                                .entry(source.rela_path().to_str_lossy().into_owned())
                                .or_default()
                                .flags |= StatusFlags::WT_DELETED;
                        }
                        by_path
                            .entry(dirwalk_entry.rela_path.to_str_lossy().into_owned())
                            .or_default()
                            .flags |= StatusFlags::WT_NEW;
                    }
                },
                gix::status::Item::TreeIndex(change) => {
                    use gix::diff::index::ChangeRef;

                    let (path, flags, orig_path) = match change {
                        ChangeRef::Addition { location, .. } => {
                            (location, StatusFlags::INDEX_NEW, None)
                        }
                        ChangeRef::Deletion { location, .. } => {
                            (location, StatusFlags::INDEX_DELETED, None)
                        }
                        ChangeRef::Modification { location, .. } => {
                            (location, StatusFlags::INDEX_MODIFIED, None)
                        }
                        ChangeRef::Rewrite {
                            source_location,
                            location,
                            copy,
                            ..
                        } => {
                            let flags = if copy {
                                StatusFlags::INDEX_COPIED
                            } else {
                                StatusFlags::INDEX_RENAMED
                            };
                            let source = source_location.to_str_lossy().into_owned();
                            (location, flags, Some(source))
                        }
                    };
                    let slot = by_path
                        .entry(path.to_str_lossy().into_owned())
                        .or_default();
                    slot.flags |= flags;
                    if orig_path.is_some() {
                        slot.orig_path = orig_path;
                    }
                }
            }
        }

        let mut entries = by_path
            .into_iter()
            .map(|(path, acc)| {
                // Unmerged paths show up on both sides; report them once, as conflicts.
                let mut flags = if acc.flags.contains(StatusFlags::CONFLICTED) {
                    StatusFlags::CONFLICTED
                } else {
                    acc.flags
                };
                if flags.intersects(StatusFlags::WT_NEW | StatusFlags::WT_MODIFIED)
                    && is_unreadable(&self.spec.workdir.join(&path))
                {
                    flags |= StatusFlags::WT_UNREADABLE;
                }
                StatusEntry {
                    path,
                    flags,
                    orig_path: acc.orig_path,
                }
            })
            .collect::<Vec<_>>();

        if query.include_unmodified {
            let index = repo
                .index_or_empty()
                .map_err(|e| backend_error("gix index", e))?;
            let known = entries
                .iter()
                .map(|e| e.path.clone())
                .collect::<FxHashSet<_>>();
            let mut clean = Vec::new();
            for entry in index.entries() {
                let path = entry.path(&index).to_str_lossy().into_owned();
                if !known.contains(&path) {
                    clean.push(StatusEntry {
                        path,
                        flags: StatusFlags::empty(),
                        orig_path: None,
                    });
                }
            }
            entries.extend(clean);
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        Ok(entries)
    }
}

fn worktree_flags<T, U>(
    status: gix::status::plumbing::index_as_worktree::EntryStatus<T, U>,
) -> Option<StatusFlags> {
    use gix::status::plumbing::index_as_worktree::{Change, EntryStatus};

    match status {
        EntryStatus::Conflict(_) => Some(StatusFlags::CONFLICTED),
        EntryStatus::IntentToAdd => Some(StatusFlags::WT_NEW),
        // Only the stat data changed; the content matches the index.
        EntryStatus::NeedsUpdate(_) => None,
        EntryStatus::Change(change) => Some(match change {
            Change::Removed => StatusFlags::WT_DELETED,
            Change::Type { .. } => StatusFlags::WT_TYPECHANGE,
            Change::Modification { .. } | Change::SubmoduleModification(_) => {
                StatusFlags::WT_MODIFIED
            }
        }),
    }
}

fn is_unreadable(path: &Path) -> bool {
    match std::fs::File::open(path) {
        Ok(_) => false,
        Err(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
    }
}
