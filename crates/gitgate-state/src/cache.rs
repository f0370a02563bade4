use gitgate_core::diff::DiffResult;
use gitgate_core::domain::DiffTarget;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_DIFF_CACHE_CAPACITY: usize = 64;

/// Bounded LRU cache of parsed diffs with single-flight computation.
///
/// Failures are handed to every caller waiting on the same computation but are
/// never stored. A `flush` discards every ready entry. Computations that started
/// before it finish without populating the cache, and a later caller for the
/// same key waits for the stale one to end before starting its own, so at most
/// one computation per key runs at a time.
pub struct DiffCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    slots: FxHashMap<DiffTarget, Slot>,
    generation: u64,
    tick: u64,
}

enum Slot {
    Ready {
        diff: Arc<DiffResult>,
        last_used: u64,
    },
    Pending(Arc<Flight>),
}

struct Flight {
    generation: u64,
    outcome: Mutex<Option<Result<Arc<DiffResult>>>>,
    done: Condvar,
}

impl Flight {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Result<Arc<DiffResult>>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        drop(slot);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<Arc<DiffResult>> {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for DiffCache {
    fn default() -> Self {
        Self::new(DEFAULT_DIFF_CACHE_CAPACITY)
    }
}

impl DiffCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ready entries.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &DiffTarget) -> Option<Arc<DiffResult>> {
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        match state.slots.get_mut(key) {
            Some(Slot::Ready { diff, last_used }) => {
                *last_used = tick;
                Some(Arc::clone(diff))
            }
            _ => None,
        }
    }

    /// Returns the cached diff for `key`, joining an in-flight computation for
    /// the same key, or runs `compute` and stores its successful result.
    pub fn compute_and_store(
        &self,
        key: &DiffTarget,
        compute: impl FnOnce() -> Result<DiffResult>,
    ) -> Result<Arc<DiffResult>> {
        let (flight, generation) = loop {
            let mut state = self.lock();
            state.tick += 1;
            let tick = state.tick;
            let generation = state.generation;
            match state.slots.get_mut(key) {
                Some(Slot::Ready { diff, last_used }) => {
                    *last_used = tick;
                    return Ok(Arc::clone(diff));
                }
                Some(Slot::Pending(flight)) if flight.generation == generation => {
                    let flight = Arc::clone(flight);
                    drop(state);
                    tracing::debug!(path = key.path(), "waiting for in-flight diff");
                    return flight.wait();
                }
                Some(Slot::Pending(flight)) => {
                    // Started before a flush; its result is stale for us.
                    let flight = Arc::clone(flight);
                    drop(state);
                    tracing::debug!(path = key.path(), "waiting for stale diff to finish");
                    let _ = flight.wait();
                    continue;
                }
                None => {}
            }
            let flight = Arc::new(Flight::new(generation));
            state
                .slots
                .insert(key.clone(), Slot::Pending(Arc::clone(&flight)));
            break (flight, generation);
        };

        let guard = FlightGuard {
            cache: self,
            key,
            flight: &flight,
            generation,
            finished: false,
        };
        tracing::debug!(path = key.path(), "computing diff");
        let outcome = compute().map(Arc::new);
        guard.finish(outcome)
    }

    /// Drops every ready entry. In-flight computations keep their waiters but
    /// their results are not stored.
    pub fn flush(&self) {
        let mut state = self.lock();
        state.generation += 1;
        let before = state.slots.len();
        state
            .slots
            .retain(|_, slot| matches!(slot, Slot::Pending(_)));
        let dropped = before - state.slots.len();
        tracing::debug!(dropped, "flushed diff cache");
    }

    fn settle(
        &self,
        key: &DiffTarget,
        flight: &Arc<Flight>,
        generation: u64,
        outcome: &Result<Arc<DiffResult>>,
    ) {
        let mut state = self.lock();
        let ours = matches!(
            state.slots.get(key),
            Some(Slot::Pending(pending)) if Arc::ptr_eq(pending, flight)
        );
        if !ours {
            return;
        }
        match outcome {
            Ok(diff) if state.generation == generation => {
                state.tick += 1;
                let last_used = state.tick;
                state.slots.insert(
                    key.clone(),
                    Slot::Ready {
                        diff: Arc::clone(diff),
                        last_used,
                    },
                );
                self.evict_over_capacity(&mut state);
            }
            _ => {
                state.slots.remove(key);
            }
        }
    }

    fn evict_over_capacity(&self, state: &mut CacheState) {
        loop {
            let mut ready = 0usize;
            let mut oldest: Option<(&DiffTarget, u64)> = None;
            for (key, slot) in &state.slots {
                if let Slot::Ready { last_used, .. } = slot {
                    ready += 1;
                    if oldest.is_none_or(|(_, used)| *last_used < used) {
                        oldest = Some((key, *last_used));
                    }
                }
            }
            if ready <= self.capacity {
                return;
            }
            let Some((key, _)) = oldest else {
                return;
            };
            let key = key.clone();
            tracing::debug!(path = key.path(), "evicting diff");
            state.slots.remove(&key);
        }
    }
}

/// Settles a flight exactly once, including when `compute` panics.
struct FlightGuard<'a> {
    cache: &'a DiffCache,
    key: &'a DiffTarget,
    flight: &'a Arc<Flight>,
    generation: u64,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, outcome: Result<Arc<DiffResult>>) -> Result<Arc<DiffResult>> {
        self.finished = true;
        self.cache
            .settle(self.key, self.flight, self.generation, &outcome);
        self.flight.complete(outcome.clone());
        outcome
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let outcome = Err(Error::new(ErrorKind::Backend(
            "diff computation panicked".to_string(),
        )));
        self.cache
            .settle(self.key, self.flight, self.generation, &outcome);
        self.flight.complete(outcome);
    }
}
