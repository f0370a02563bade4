use super::{GixRepo, backend_error};
use crate::util::unix_seconds_to_system_time_or_epoch;
use gitgate_core::domain::{Commit, CommitId, LogCursor, LogPage};
use gitgate_core::services::Result;
use gix::bstr::ByteSlice as _;
use gix::traverse::commit::simple::CommitTimeOrder;

/// Skips walk entries up to and including the cursor's commit.
struct CursorGate<'a> {
    cursor: Option<&'a LogCursor>,
    started: bool,
}

impl<'a> CursorGate<'a> {
    fn new(cursor: Option<&'a LogCursor>) -> Self {
        Self {
            cursor,
            started: cursor.is_none(),
        }
    }

    fn should_skip(&mut self, id: &str) -> bool {
        if self.started {
            return false;
        }
        if let Some(cursor) = self.cursor
            && cursor.last_seen.0 == id
        {
            self.started = true;
        }
        true
    }
}

fn commit_from_walk_info(info: &gix::revision::walk::Info<'_>, id: String) -> Result<Commit> {
    let commit_obj = info
        .object()
        .map_err(|e| backend_error("gix commit object", e))?;

    let summary = commit_obj
        .message_raw_sloppy()
        .lines()
        .next()
        .unwrap_or_default()
        .to_str_lossy()
        .into_owned();

    let author = commit_obj
        .author()
        .map(|s| s.name.to_str_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let seconds = commit_obj.time().map(|t| t.seconds).unwrap_or(0);

    let parent_ids = info
        .parent_ids()
        .map(|parent_id| CommitId(parent_id.detach().to_string()))
        .collect::<Vec<_>>();

    Ok(Commit {
        id: CommitId(id),
        parent_ids,
        summary,
        author,
        time: unix_seconds_to_system_time_or_epoch(seconds),
    })
}

impl GixRepo {
    pub(super) fn log_head_page_impl(
        &self,
        limit: usize,
        cursor: Option<&LogCursor>,
    ) -> Result<LogPage> {
        let repo = self.repo.to_thread_local();
        let head = repo.head().map_err(|e| backend_error("gix head", e))?;
        let Some(head_id) = head.id().map(|id| id.detach()) else {
            // Unborn branch: no history yet.
            return Ok(LogPage::default());
        };

        let walk = repo
            .rev_walk([head_id])
            .sorting(gix::revision::walk::Sorting::ByCommitTime(
                CommitTimeOrder::NewestFirst,
            ))
            .all()
            .map_err(|e| backend_error("gix rev_walk", e))?;

        let mut cursor_gate = CursorGate::new(cursor);
        let mut commits = Vec::with_capacity(limit.min(2048));
        let mut next_cursor = None;

        for info in walk {
            let info = info.map_err(|e| backend_error("gix walk", e))?;
            let id = info.id().detach().to_string();
            if cursor_gate.should_skip(&id) {
                continue;
            }

            commits.push(commit_from_walk_info(&info, id)?);
            if commits.len() >= limit {
                next_cursor = commits.last().map(|c| LogCursor {
                    last_seen: c.id.clone(),
                });
                break;
            }
        }

        Ok(LogPage {
            commits,
            next_cursor,
        })
    }
}
