use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The background execution context of one repository: a single worker thread
/// running tasks in submission order.
pub struct TaskQueue {
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    worker_id: thread::ThreadId,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("background task panicked");
                    }
                    worker_pending.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .map_err(Error::from)?;
        let worker_id = worker.thread().id();

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            pending,
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// Tasks submitted and not yet finished, including the running one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(Error::new(ErrorKind::RepositoryShuttingDown));
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(Box::new(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::new(ErrorKind::RepositoryShuttingDown));
        }
        Ok(())
    }

    /// Rejects new tasks, lets queued ones run, and joins the worker unless called
    /// from it. Idempotent.
    pub fn shut_down(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if self.is_worker_thread() {
            return;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Same-thread task queue of the thread that owns a repository handle.
///
/// Background work posts follow-ups here; they run when the owner calls
/// [`MainQueue::run_pending`] or while it blocks in [`MainQueue::wait_for`].
#[derive(Clone, Default)]
pub struct MainQueue {
    inner: Arc<MainInner>,
}

#[derive(Default)]
struct MainInner {
    tasks: Mutex<VecDeque<Task>>,
    wake: Condvar,
}

impl MainInner {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MainQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.lock().push_back(Box::new(task));
        self.inner.wake.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every task queued so far, plus any they post. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = self.inner.lock().pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Runs `work` on `tasks` and blocks until it finishes, draining this queue
    /// in the meantime so `work` may depend on tasks it posts here.
    pub fn wait_for<T: Send + 'static>(
        &self,
        tasks: &TaskQueue,
        work: impl FnOnce() -> T + Send + 'static,
    ) -> Result<T> {
        if tasks.is_worker_thread() {
            return Ok(work());
        }

        let result = Arc::new(Mutex::new(None::<T>));
        let finished = Arc::new(AtomicBool::new(false));
        {
            let result = Arc::clone(&result);
            let done = Done {
                inner: Arc::clone(&self.inner),
                finished: Arc::clone(&finished),
            };
            tasks.spawn(move || {
                let _done = done;
                let value = work();
                *result.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
            })?;
        }

        let mut queue = self.inner.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                drop(queue);
                task();
                queue = self.inner.lock();
                continue;
            }
            if finished.load(Ordering::SeqCst) {
                break;
            }
            queue = self
                .inner
                .wake
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(queue);

        result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                Error::new(ErrorKind::Backend(
                    "background task did not complete".to_string(),
                ))
            })
    }
}

/// Wakes a blocked [`MainQueue::wait_for`] when the background task ends, even
/// by panic or by being dropped unrun.
struct Done {
    inner: Arc<MainInner>,
    finished: Arc<AtomicBool>,
}

impl Drop for Done {
    fn drop(&mut self) {
        let guard = self.inner.lock();
        self.finished.store(true, Ordering::SeqCst);
        drop(guard);
        self.inner.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tasks_run_in_submission_order() {
        let queue = TaskQueue::new("test-worker").unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            queue.spawn(move || tx.send(i).unwrap()).unwrap();
        }
        let seen = (0..10).map(|_| rx.recv().unwrap()).collect::<Vec<_>>();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shut_down_drains_then_rejects() {
        let queue = TaskQueue::new("test-worker").unwrap();
        let (tx, rx) = mpsc::channel();
        queue
            .spawn(move || {
                thread::sleep(Duration::from_millis(20));
                tx.send(()).unwrap();
            })
            .unwrap();
        assert!(queue.is_busy());
        queue.shut_down();
        assert!(rx.try_recv().is_ok());
        assert!(!queue.is_busy());

        let err = queue.spawn(|| {}).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RepositoryShuttingDown);
        queue.shut_down();
    }

    #[test]
    fn panicking_task_does_not_kill_the_worker() {
        let queue = TaskQueue::new("test-worker").unwrap();
        queue.spawn(|| panic!("boom")).unwrap();
        let main = MainQueue::new();
        assert_eq!(main.wait_for(&queue, || 7).unwrap(), 7);
    }

    #[test]
    fn wait_for_pumps_tasks_the_work_depends_on() {
        let queue = TaskQueue::new("test-worker").unwrap();
        let main = MainQueue::new();
        let poster = main.clone();

        let value = main
            .wait_for(&queue, move || {
                let (tx, rx) = mpsc::channel();
                poster.post(move || tx.send(41).unwrap());
                // Deadlocks unless the blocked caller services its own queue.
                rx.recv().unwrap() + 1
            })
            .unwrap();
        assert_eq!(value, 42);
        assert!(main.is_empty());
    }

    #[test]
    fn wait_for_reports_a_panicking_task() {
        let queue = TaskQueue::new("test-worker").unwrap();
        let main = MainQueue::new();
        let err = main
            .wait_for(&queue, || -> u32 { panic!("boom") })
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Backend(_)));
    }

    #[test]
    fn run_pending_runs_follow_ups() {
        let main = MainQueue::new();
        let (tx, rx) = mpsc::channel();
        let again = main.clone();
        main.post(move || {
            let tx = tx.clone();
            again.post(move || tx.send(2).unwrap());
        });
        assert_eq!(main.run_pending(), 2);
        assert_eq!(rx.recv().unwrap(), 2);
    }
}
