use crate::model::{ChangeAreas, RepoEvent, RepoEventKind, RepoId};
use std::sync::{Mutex, PoisonError, mpsc};
use std::time::{Duration, Instant};

/// Fan-out of repository events to any number of subscribers.
///
/// Sending happens under one lock, so every subscriber observes events in the
/// order their causes were reported.
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<mpsc::Sender<RepoEvent>>>,
}

impl Notifier {
    pub fn subscribe(&self) -> mpsc::Receiver<RepoEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers a burst of events, dropping subscribers whose receiver is gone.
    pub fn send_all(&self, events: impl IntoIterator<Item = RepoEvent>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for event in events {
            tracing::debug!(repo_id = event.repo_id.0, kind = ?event.kind, expected = event.expected, "repository event");
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// Builds the events for a set of touched areas, in a fixed order, closing with
/// `RepositoryChanged`.
pub(crate) fn events_for(
    repo_id: RepoId,
    areas: ChangeAreas,
    paths: Vec<String>,
    expected: impl Fn(ChangeAreas) -> bool,
) -> Vec<RepoEvent> {
    let mut kinds = Vec::with_capacity(5);
    if areas.contains(ChangeAreas::INDEX) {
        kinds.push(RepoEventKind::IndexChanged);
    }
    if areas.contains(ChangeAreas::REFS) {
        kinds.push(RepoEventKind::RefsChanged);
    }
    if areas.contains(ChangeAreas::HEAD) {
        kinds.push(RepoEventKind::HeadChanged);
    }
    if areas.contains(ChangeAreas::WORKSPACE) {
        kinds.push(RepoEventKind::WorkspaceChanged { paths });
    }
    if areas.is_empty() {
        return Vec::new();
    }
    kinds.push(RepoEventKind::RepositoryChanged);

    kinds
        .into_iter()
        .map(|kind| {
            let area = if kind == RepoEventKind::RepositoryChanged {
                areas
            } else {
                kind.area()
            };
            RepoEvent {
                repo_id,
                expected: expected(area),
                kind,
            }
        })
        .collect()
}

/// Areas a write through the gateway announced it is about to change, each with
/// a deadline.
#[derive(Default)]
pub(crate) struct ExpectedChanges {
    marks: Mutex<Vec<(ChangeAreas, Instant)>>,
}

impl ExpectedChanges {
    pub(crate) fn mark(&self, areas: ChangeAreas, window: Duration, now: Instant) {
        if areas.is_empty() {
            return;
        }
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.retain(|(_, until)| *until > now);
        marks.push((areas, now + window));
    }

    /// True when every area in `areas` is covered by a live mark.
    pub(crate) fn is_expected(&self, areas: ChangeAreas, now: Instant) -> bool {
        if areas.is_empty() {
            return false;
        }
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        let covered = marks
            .iter()
            .filter(|(_, until)| *until > now)
            .fold(ChangeAreas::empty(), |acc, (marked, _)| acc | *marked);
        covered.contains(areas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_follow_area_order_and_end_with_repository_changed() {
        let events = events_for(
            RepoId(7),
            ChangeAreas::WORKSPACE | ChangeAreas::INDEX,
            vec!["a.txt".into()],
            |_| false,
        );
        let kinds = events.iter().map(|e| e.kind.clone()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                RepoEventKind::IndexChanged,
                RepoEventKind::WorkspaceChanged {
                    paths: vec!["a.txt".into()]
                },
                RepoEventKind::RepositoryChanged,
            ]
        );
        assert!(events.iter().all(|e| e.repo_id == RepoId(7)));
        assert!(events_for(RepoId(7), ChangeAreas::empty(), Vec::new(), |_| true).is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let notifier = Notifier::default();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.send_all(events_for(
            RepoId(1),
            ChangeAreas::REFS,
            Vec::new(),
            |_| false,
        ));
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap().kind, RepoEventKind::RefsChanged);
        assert_eq!(
            kept.try_recv().unwrap().kind,
            RepoEventKind::RepositoryChanged
        );
    }

    #[test]
    fn expected_marks_expire() {
        let expected = ExpectedChanges::default();
        let now = Instant::now();
        expected.mark(
            ChangeAreas::INDEX | ChangeAreas::REFS,
            Duration::from_millis(100),
            now,
        );
        assert!(expected.is_expected(ChangeAreas::INDEX, now));
        assert!(expected.is_expected(ChangeAreas::INDEX | ChangeAreas::REFS, now));
        assert!(!expected.is_expected(ChangeAreas::WORKSPACE, now));
        assert!(!expected.is_expected(
            ChangeAreas::INDEX,
            now + Duration::from_millis(100)
        ));
    }
}
