//! Upload progress state machine and observer fan-out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{UploadPhase, UploadProgressState};

/// Callback invoked with a snapshot on every state transition.
pub type ProgressObserver = Arc<dyn Fn(&UploadProgressState) + Send + Sync>;

/// Token for one upload operation. Updates carrying a stale token are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationId(u64);

#[derive(Default)]
struct Inner {
    state: UploadProgressState,
    generation: u64,
    in_flight: bool,
    /// Snapshots not yet delivered, in the order the state changed
    pending: VecDeque<UploadProgressState>,
    delivering: bool,
}

/// Owns the progress state of one upload pipeline.
///
/// Observers are called after the internal lock is released, so they may
/// read the tracker (or call [`reset`](Self::reset)) without deadlocking.
/// Snapshots are queued under the lock and delivered by one thread at a
/// time, so observers see transitions in the order they happened even when
/// a reset races an in-flight update.
#[derive(Default)]
pub struct ProgressTracker {
    inner: Mutex<Inner>,
    observers: Mutex<Vec<ProgressObserver>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: ProgressObserver) {
        lock(&self.observers).push(observer);
    }

    pub fn snapshot(&self) -> UploadProgressState {
        lock(&self.inner).state.clone()
    }

    /// Claim the pipeline for a new operation. `None` while one is in flight.
    pub fn begin(&self) -> Option<OperationId> {
        let mut inner = lock(&self.inner);
        if inner.in_flight {
            return None;
        }
        inner.in_flight = true;
        inner.generation += 1;
        inner.state = UploadProgressState::idle();
        Some(OperationId(inner.generation))
    }

    /// Move to `phase` at `progress`. Progress never goes backwards within
    /// an operation.
    pub fn advance(&self, op: OperationId, phase: UploadPhase, progress: u8) {
        self.update(op, |state| {
            state.phase = phase;
            state.progress = state.progress.max(progress.min(100));
            state.error = None;
            match phase {
                UploadPhase::Uploading => {
                    state.is_uploading = true;
                    state.is_processing = false;
                }
                UploadPhase::RemoteProcessing => {
                    state.is_uploading = true;
                    state.is_processing = true;
                }
                UploadPhase::Idle | UploadPhase::Complete | UploadPhase::Error => {
                    state.is_uploading = false;
                    state.is_processing = false;
                }
            }
        });
    }

    /// Finish successfully at 100% and release the pipeline.
    pub fn complete(&self, op: OperationId) {
        self.advance(op, UploadPhase::Complete, 100);
        self.release(op);
    }

    /// Enter the error state and release the pipeline.
    pub fn fail(&self, op: OperationId, message: String) {
        self.update(op, |state| {
            *state = UploadProgressState {
                is_uploading: false,
                is_processing: false,
                progress: 0,
                error: Some(message),
                phase: UploadPhase::Error,
            };
        });
        self.release(op);
    }

    /// Return to idle after the completion display window, unless another
    /// operation or a reset happened in between.
    pub fn settle(&self, op: OperationId) {
        self.update(op, |state| {
            if state.phase == UploadPhase::Complete {
                *state = UploadProgressState::idle();
            }
        });
    }

    /// Clear all state and release the pipeline. Idempotent.
    ///
    /// Later updates from the operation that was running are ignored.
    pub fn reset(&self) {
        {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            inner.in_flight = false;
            if !inner.state.is_idle() {
                inner.state = UploadProgressState::idle();
                inner.pending.push_back(UploadProgressState::idle());
            }
        }
        self.deliver();
    }

    pub fn is_current(&self, op: OperationId) -> bool {
        lock(&self.inner).generation == op.0
    }

    fn release(&self, op: OperationId) {
        let mut inner = lock(&self.inner);
        if inner.generation == op.0 {
            inner.in_flight = false;
        }
    }

    fn update(&self, op: OperationId, apply: impl FnOnce(&mut UploadProgressState)) {
        {
            let mut inner = lock(&self.inner);
            if inner.generation != op.0 {
                tracing::trace!("Dropping progress update from superseded operation");
                return;
            }
            let before = inner.state.clone();
            apply(&mut inner.state);
            if inner.state == before {
                return;
            }
            let snapshot = inner.state.clone();
            inner.pending.push_back(snapshot);
        }
        self.deliver();
    }

    /// Drain queued snapshots to observers unless another call is already
    /// draining; that call picks up whatever was queued here.
    fn deliver(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }
        let mut turn = DeliveryTurn {
            inner: &self.inner,
            armed: true,
        };

        loop {
            let snapshot = {
                let mut inner = lock(&self.inner);
                match inner.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        // Cleared under the same lock a concurrent push checks
                        inner.delivering = false;
                        turn.armed = false;
                        return;
                    }
                }
            };
            let observers: Vec<ProgressObserver> = lock(&self.observers).clone();
            for observer in observers {
                observer(&snapshot);
            }
        }
    }
}

/// Hands the delivery role back if an observer panics mid-drain.
struct DeliveryTurn<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for DeliveryTurn<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.inner).delivering = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking observer must not wedge the pipeline
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(tracker: &ProgressTracker) -> Arc<Mutex<Vec<UploadProgressState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tracker.subscribe(Arc::new(move |s: &UploadProgressState| {
            sink.lock().unwrap().push(s.clone())
        }));
        seen
    }

    #[test]
    fn test_progress_is_monotonic() {
        let tracker = ProgressTracker::new();
        let seen = recording(&tracker);
        let op = tracker.begin().unwrap();

        tracker.advance(op, UploadPhase::Uploading, 25);
        tracker.advance(op, UploadPhase::Uploading, 10);
        assert_eq!(tracker.snapshot().progress, 25);
        tracker.complete(op);

        let progress: Vec<u8> = seen.lock().unwrap().iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![25, 100]);
    }

    #[test]
    fn test_busy_until_released() {
        let tracker = ProgressTracker::new();
        let op = tracker.begin().unwrap();
        assert!(tracker.begin().is_none());
        tracker.fail(op, "boom".to_string());
        assert!(tracker.begin().is_some());
    }

    #[test]
    fn test_error_clears_flags() {
        let tracker = ProgressTracker::new();
        let op = tracker.begin().unwrap();
        tracker.advance(op, UploadPhase::RemoteProcessing, 50);
        tracker.fail(op, "Processing failed".to_string());

        let state = tracker.snapshot();
        assert_eq!(state.phase, UploadPhase::Error);
        assert_eq!(state.progress, 0);
        assert!(!state.is_uploading && !state.is_processing);
        assert_eq!(state.error.as_deref(), Some("Processing failed"));
    }

    #[test]
    fn test_reset_is_idempotent_and_drops_stale_updates() {
        let tracker = ProgressTracker::new();
        let seen = recording(&tracker);
        let op = tracker.begin().unwrap();
        tracker.advance(op, UploadPhase::Uploading, 10);

        tracker.reset();
        tracker.reset();
        tracker.advance(op, UploadPhase::RemoteProcessing, 50);

        assert!(tracker.snapshot().is_idle());
        assert!(!tracker.is_current(op));
        // one update, one reset broadcast; the second reset and stale update are silent
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(tracker.begin().is_some());
    }

    #[test]
    fn test_settle_only_from_complete() {
        let tracker = ProgressTracker::new();
        let op = tracker.begin().unwrap();
        tracker.complete(op);
        tracker.settle(op);
        assert!(tracker.snapshot().is_idle());

        let op = tracker.begin().unwrap();
        tracker.fail(op, "nope".to_string());
        tracker.settle(op);
        assert_eq!(tracker.snapshot().phase, UploadPhase::Error);
    }

    #[test]
    fn test_observer_may_read_tracker() {
        let tracker = Arc::new(ProgressTracker::new());
        let inner = Arc::clone(&tracker);
        let seen = Arc::new(Mutex::new(0u8));
        let sink = Arc::clone(&seen);
        tracker.subscribe(Arc::new(move |_| {
            *sink.lock().unwrap() = inner.snapshot().progress;
        }));

        let op = tracker.begin().unwrap();
        tracker.advance(op, UploadPhase::Uploading, 10);
        assert_eq!(*seen.lock().unwrap(), 10);
    }

    #[test]
    fn test_observer_may_reset() {
        let tracker = Arc::new(ProgressTracker::new());
        let seen = recording(&tracker);
        let weak = Arc::downgrade(&tracker);
        tracker.subscribe(Arc::new(move |s: &UploadProgressState| {
            if s.progress == 25 {
                if let Some(tracker) = weak.upgrade() {
                    tracker.reset();
                }
            }
        }));

        let op = tracker.begin().unwrap();
        tracker.advance(op, UploadPhase::Uploading, 10);
        tracker.advance(op, UploadPhase::Uploading, 25);
        tracker.advance(op, UploadPhase::RemoteProcessing, 50);

        let progress: Vec<u8> = seen.lock().unwrap().iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![10, 25, 0]);
        assert!(seen.lock().unwrap().last().unwrap().is_idle());
        assert!(tracker.snapshot().is_idle());
    }

    #[test]
    fn test_racing_reset_is_delivered_last() {
        let tracker = ProgressTracker::new();
        let seen = recording(&tracker);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    if let Some(op) = tracker.begin() {
                        tracker.advance(op, UploadPhase::Uploading, 10);
                        tracker.advance(op, UploadPhase::Uploading, 25);
                        tracker.advance(op, UploadPhase::RemoteProcessing, 50);
                    }
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    tracker.reset();
                    std::thread::yield_now();
                }
            });
        });
        tracker.reset();

        let last = seen.lock().unwrap().last().cloned().unwrap_or_default();
        assert_eq!(last, tracker.snapshot());
        assert!(tracker.snapshot().is_idle());
    }
}
