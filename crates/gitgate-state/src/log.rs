use crate::gateway::RepositoryGateway;
use gitgate_core::domain::{Commit, LogCursor};
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_LOG_PAGE_SIZE: usize = 200;

/// Cooperative stop flag shared between a reader and whoever wants it to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Lazily paged history of HEAD, newest first.
///
/// Checks its [`CancelToken`] before every commit; a cancelled log yields one
/// `Cancelled` error and then ends. Any error ends the iteration until
/// [`CommitLog::restart`].
pub struct CommitLog {
    gateway: Arc<RepositoryGateway>,
    page_size: usize,
    cancel: CancelToken,
    buffer: VecDeque<Commit>,
    cursor: Option<LogCursor>,
    exhausted: bool,
    finished: bool,
}

impl CommitLog {
    pub fn new(gateway: Arc<RepositoryGateway>, page_size: usize) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
            cancel: CancelToken::new(),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            finished: false,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Starts over from the current HEAD and clears a previous cancellation.
    pub fn restart(&mut self) {
        self.cancel.reset();
        self.buffer.clear();
        self.cursor = None;
        self.exhausted = false;
        self.finished = false;
    }

    fn fill(&mut self) -> Result<()> {
        let page = self
            .gateway
            .log_page(self.page_size, self.cursor.as_ref())?;
        tracing::debug!(commits = page.commits.len(), "loaded log page");
        self.exhausted = page.next_cursor.is_none() || page.commits.is_empty();
        self.cursor = page.next_cursor;
        self.buffer.extend(page.commits);
        Ok(())
    }
}

impl Iterator for CommitLog {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Some(Err(
                Error::new(ErrorKind::Cancelled).with_operation("log")
            ));
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.finished = true;
                return Some(Err(e));
            }
        }
        match self.buffer.pop_front() {
            Some(commit) => Some(Ok(commit)),
            None => {
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::model::RepoId;
    use crate::notify::Notifier;
    use crate::test_support::FakeRepo;

    fn log_over(commits: usize, page_size: usize) -> (Arc<FakeRepo>, CommitLog) {
        let repo = Arc::new(FakeRepo::new());
        for i in 0..commits {
            repo.push_commit(&format!("commit {i}"));
        }
        let gateway = Arc::new(RepositoryGateway::new(
            RepoId(1),
            repo.clone(),
            &RepositoryConfig::default(),
            Arc::new(Notifier::default()),
        ));
        (repo, CommitLog::new(gateway, page_size))
    }

    #[test]
    fn walks_every_page_newest_first() {
        let (repo, log) = log_over(5, 2);
        let summaries = log
            .map(|c| c.unwrap().summary)
            .collect::<Vec<_>>();
        assert_eq!(
            summaries,
            vec!["commit 4", "commit 3", "commit 2", "commit 1", "commit 0"]
        );
        assert_eq!(repo.log_page_calls(), 3);
    }

    #[test]
    fn cancellation_stops_between_commits_and_restart_resumes() {
        let (_repo, mut log) = log_over(5, 2);
        let token = log.cancel_token();

        assert_eq!(log.next().unwrap().unwrap().summary, "commit 4");
        token.cancel();
        let err = log.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Cancelled);
        assert!(log.next().is_none());

        log.restart();
        assert!(!token.is_cancelled());
        assert_eq!(log.count(), 5);
    }

    #[test]
    fn empty_history_ends_immediately() {
        let (_repo, mut log) = log_over(0, 10);
        assert!(log.next().is_none());
    }
}
