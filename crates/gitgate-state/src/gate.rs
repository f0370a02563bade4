use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// FIFO write-serialization gate for one repository.
///
/// Writers take a ticket and run strictly in ticket order; at most one holds the
/// gate at a time. After `shut_down` no new tickets are issued, but tickets
/// already handed out still run.
#[derive(Default)]
pub struct WriteGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

#[derive(Default)]
struct GateState {
    next_ticket: u64,
    now_serving: u64,
    writing: bool,
    shutting_down: bool,
}

impl GateState {
    fn outstanding(&self) -> u64 {
        self.next_ticket - self.now_serving
    }
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_writing(&self) -> bool {
        self.lock().writing
    }

    /// Writers waiting for their turn, not counting the one in flight.
    pub fn queued(&self) -> usize {
        let state = self.lock();
        (state.outstanding() - u64::from(state.writing)) as usize
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Runs `write` once every earlier writer has finished.
    pub fn run<T>(&self, write: impl FnOnce() -> Result<T>) -> Result<T> {
        let ticket = self.take_ticket(false)?;
        self.run_ticket(ticket, write)
    }

    /// Like [`WriteGate::run`], but fails with `WriteLockUnavailable` instead of
    /// queueing behind other writers.
    pub fn try_run<T>(&self, write: impl FnOnce() -> Result<T>) -> Result<T> {
        let ticket = self.take_ticket(true)?;
        self.run_ticket(ticket, write)
    }

    fn take_ticket(&self, fail_if_busy: bool) -> Result<u64> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(Error::new(ErrorKind::RepositoryShuttingDown));
        }
        if fail_if_busy && state.outstanding() > 0 {
            return Err(Error::new(ErrorKind::WriteLockUnavailable));
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        Ok(ticket)
    }

    fn run_ticket<T>(&self, ticket: u64, write: impl FnOnce() -> Result<T>) -> Result<T> {
        {
            let mut state = self.lock();
            while state.now_serving != ticket {
                state = self
                    .turn
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.writing = true;
        }
        let _turn = Turn { gate: self };
        write()
    }

    /// Blocks until no write is in flight.
    pub fn wait_idle(&self) {
        let mut state = self.lock();
        while state.writing {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops issuing tickets without waiting for accepted writers.
    pub fn close(&self) {
        self.lock().shutting_down = true;
    }

    /// Stops issuing tickets and waits for every accepted writer to finish.
    /// Idempotent. Must not be called from inside a write.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        while state.outstanding() > 0 {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Hands the gate to the next ticket, including when the write panics.
struct Turn<'a> {
    gate: &'a WriteGate,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.writing = false;
        state.now_serving += 1;
        drop(state);
        self.gate.turn.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    #[test]
    fn writers_run_in_ticket_order_without_overlap() {
        let gate = Arc::new(WriteGate::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));
        let in_write = Arc::new(AtomicBool::new(false));

        let first = {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                gate.run(|| {
                    order.lock().unwrap().push(0);
                    release_rx.recv().unwrap();
                    Ok(())
                })
            })
        };
        wait_until(|| gate.is_writing());

        let mut handles = Vec::new();
        for i in 1..=4 {
            let gate_for_thread = Arc::clone(&gate);
            let order = Arc::clone(&order);
            let in_write = Arc::clone(&in_write);
            handles.push(thread::spawn(move || {
                gate_for_thread.run(|| {
                    assert!(!in_write.swap(true, Ordering::SeqCst));
                    order.lock().unwrap().push(i);
                    thread::sleep(Duration::from_millis(2));
                    in_write.store(false, Ordering::SeqCst);
                    Ok(())
                })
            }));
            // Each writer takes its ticket before the next one starts.
            wait_until(|| gate.queued() == i);
        }

        release_tx.send(()).unwrap();
        first.join().unwrap().unwrap();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!gate.is_writing());
        assert_eq!(gate.queued(), 0);
    }

    #[test]
    fn try_run_refuses_while_busy() {
        let gate = Arc::new(WriteGate::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let busy = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.run(|| {
                    release_rx.recv().unwrap();
                    Ok(())
                })
            })
        };
        wait_until(|| gate.is_writing());

        let err = gate.try_run(|| Ok(())).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WriteLockUnavailable);

        release_tx.send(()).unwrap();
        busy.join().unwrap().unwrap();
        assert_eq!(gate.try_run(|| Ok(5)).unwrap(), 5);
    }

    #[test]
    fn shut_down_waits_for_in_flight_and_rejects_new_writes() {
        let gate = Arc::new(WriteGate::new());
        let finished = Arc::new(AtomicBool::new(false));
        let writer = {
            let gate = Arc::clone(&gate);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                gate.run(|| {
                    thread::sleep(Duration::from_millis(30));
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                })
            })
        };
        wait_until(|| gate.is_writing());

        gate.shut_down();
        assert!(finished.load(Ordering::SeqCst));
        gate.shut_down();

        let err = gate.run(|| Ok(())).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RepositoryShuttingDown);
        writer.join().unwrap().unwrap();
    }

    #[test]
    fn close_rejects_new_writes_without_waiting() {
        let gate = Arc::new(WriteGate::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let writer = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.run(|| {
                    let _ = release_rx.recv();
                    Ok(())
                })
            })
        };
        wait_until(|| gate.is_writing());

        gate.close();
        assert!(gate.is_writing());
        assert!(gate.is_shutting_down());
        let err = gate.run(|| Ok(())).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RepositoryShuttingDown);

        release_tx.send(()).unwrap();
        writer.join().unwrap().unwrap();
        gate.shut_down();
        assert!(!gate.is_writing());
    }

    #[test]
    fn failed_write_releases_the_gate() {
        let gate = WriteGate::new();
        let err = gate
            .run::<()>(|| Err(Error::new(ErrorKind::GitCommandFailed)))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::GitCommandFailed);
        assert!(!gate.is_writing());
        gate.run(|| Ok(())).unwrap();
    }
}
