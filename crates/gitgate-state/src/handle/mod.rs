use crate::command::RepoCommand;
use crate::config::RepositoryConfig;
use crate::gateway::RepositoryGateway;
use crate::log::CommitLog;
use crate::model::{RepoEvent, RepoId};
use crate::notify::Notifier;
use crate::staging::{StagingModel, StagingSnapshot};
use gitgate_core::domain::RepoSpec;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::{GitBackend, GitRepository, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};

pub mod executor;
pub(crate) mod repo_monitor;

use executor::{MainQueue, TaskQueue};
use repo_monitor::RepoMonitor;

/// One open repository and everything that belongs to it: the gateway, the
/// staging model, the background queue and the filesystem watcher.
///
/// Lifecycle is open, operate, [`shut_down`](Self::shut_down). Dropping the
/// handle shuts it down.
pub struct RepositoryHandle {
    id: RepoId,
    config: RepositoryConfig,
    notifier: Arc<Notifier>,
    gateway: Arc<RepositoryGateway>,
    staging: Arc<StagingModel>,
    tasks: TaskQueue,
    main: MainQueue,
    monitor: Mutex<Option<RepoMonitor>>,
    watch_error: Option<Error>,
    shut_down: AtomicBool,
}

impl RepositoryHandle {
    pub fn open(
        backend: &dyn GitBackend,
        workdir: &Path,
        config: RepositoryConfig,
    ) -> Result<Self> {
        let repo = backend
            .open(workdir)
            .map_err(|e| e.in_operation("open repository"))?;
        Self::from_repository(repo, config)
    }

    pub fn from_repository(
        repo: Arc<dyn GitRepository>,
        config: RepositoryConfig,
    ) -> Result<Self> {
        let id = RepoId::next();
        let spec = repo.spec().clone();
        let notifier = Arc::new(Notifier::default());
        let gateway = Arc::new(RepositoryGateway::new(
            id,
            repo,
            &config,
            Arc::clone(&notifier),
        ));
        let staging = Arc::new(StagingModel::new(Arc::clone(&gateway)));
        let tasks = TaskQueue::new(format!("gitgate-repo-{}", id.0))?;

        let (monitor, watch_error) = if config.watch.enabled {
            match start_monitor(&spec, &config, &gateway) {
                Ok(monitor) => (Some(monitor), None),
                Err(e) => {
                    tracing::warn!(
                        repo = id.0,
                        error = %e,
                        "filesystem watch unavailable; refresh manually"
                    );
                    (None, Some(e))
                }
            }
        } else {
            (None, None)
        };

        tracing::info!(repo = id.0, workdir = %spec.workdir.display(), "opened repository");
        Ok(Self {
            id,
            config,
            notifier,
            gateway,
            staging,
            tasks,
            main: MainQueue::new(),
            monitor: Mutex::new(monitor),
            watch_error,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> RepoId {
        self.id
    }

    pub fn spec(&self) -> &RepoSpec {
        self.gateway.spec()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<RepositoryGateway> {
        &self.gateway
    }

    pub fn staging(&self) -> &Arc<StagingModel> {
        &self.staging
    }

    /// Where completions of background work are delivered.
    pub fn main_queue(&self) -> &MainQueue {
        &self.main
    }

    pub fn subscribe(&self) -> mpsc::Receiver<RepoEvent> {
        self.notifier.subscribe()
    }

    /// Set when the watcher could not start; the handle then works in
    /// manual-refresh mode.
    pub fn watch_error(&self) -> Option<&Error> {
        self.watch_error.as_ref()
    }

    pub fn is_writing(&self) -> bool {
        self.gateway.is_writing()
    }

    /// Background work is queued or running.
    pub fn is_busy(&self) -> bool {
        self.tasks.is_busy()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::new(ErrorKind::RepositoryShuttingDown).with_operation(operation));
        }
        Ok(())
    }

    /// Runs `command` in the background, after every command performed before
    /// it, and delivers the outcome to `completion` on the main queue.
    pub fn perform(
        &self,
        command: RepoCommand,
        completion: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<()> {
        let operation = command.operation();
        self.check_open(operation)?;
        let gateway = Arc::clone(&self.gateway);
        let main = self.main.clone();
        self.tasks
            .spawn(move || {
                let result = gateway.execute(&command);
                main.post(move || completion(result));
            })
            .map_err(|e| e.in_operation(operation))
    }

    /// Runs `command` in the background and waits for it, servicing the main
    /// queue in the meantime.
    pub fn perform_blocking(&self, command: RepoCommand) -> Result<()> {
        let operation = command.operation();
        self.check_open(operation)?;
        let gateway = Arc::clone(&self.gateway);
        self.main
            .wait_for(&self.tasks, move || gateway.execute(&command))
            .map_err(|e| e.in_operation(operation))?
    }

    /// Runs a read against the gateway in the background and hands the value to
    /// `completion` on the main queue.
    pub fn read_in_background<T: Send + 'static>(
        &self,
        read: impl FnOnce(&RepositoryGateway) -> T + Send + 'static,
        completion: impl FnOnce(T) + Send + 'static,
    ) -> Result<()> {
        self.check_open("background read")?;
        let gateway = Arc::clone(&self.gateway);
        let main = self.main.clone();
        self.tasks.spawn(move || {
            let value = read(gateway.as_ref());
            main.post(move || completion(value));
        })
    }

    /// Reloads the staging model in the background.
    pub fn reload_staging(
        &self,
        completion: impl FnOnce(Result<Arc<StagingSnapshot>>) + Send + 'static,
    ) -> Result<()> {
        self.check_open("reload status")?;
        let staging = Arc::clone(&self.staging);
        let main = self.main.clone();
        self.tasks.spawn(move || {
            let result = staging.reload();
            main.post(move || completion(result));
        })
    }

    pub fn commit_log(&self, page_size: usize) -> CommitLog {
        CommitLog::new(Arc::clone(&self.gateway), page_size)
    }

    /// Stops accepting work, waits for the in-flight write and for queued
    /// background tasks, then stops the watcher. Idempotent.
    ///
    /// The main queue is serviced while waiting, so background work blocked on a
    /// follow-up it posted there still finishes.
    pub fn shut_down(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(repo = self.id.0, "shutting down repository");
        self.gateway.close();
        if let Err(e) = self.main.wait_for(&self.tasks, || ()) {
            tracing::debug!(repo = self.id.0, error = %e, "background queue already closed");
        }
        self.gateway.shut_down();
        self.tasks.shut_down();
        if let Some(mut monitor) = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            monitor.stop();
        }
        tracing::debug!(repo = self.id.0, "repository shut down");
    }
}

impl Drop for RepositoryHandle {
    fn drop(&mut self) {
        self.shut_down();
    }
}

fn start_monitor(
    spec: &RepoSpec,
    config: &RepositoryConfig,
    gateway: &Arc<RepositoryGateway>,
) -> Result<RepoMonitor> {
    let gateway = Arc::clone(gateway);
    let mut last_head = gateway.head().ok();
    RepoMonitor::start(
        &spec.workdir,
        Some(&spec.git_dir),
        &config.watch,
        move |change| gateway.reconcile_external_change(change, &mut last_head),
    )
}
