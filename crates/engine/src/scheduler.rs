use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use stylebook_core::ids::UserId;

struct PendingRun {
    ticket: u64,
    due: Instant,
    handle: JoinHandle<()>,
}

/// At most one delayed reconciliation per user. Scheduling again replaces
/// the pending one, so a burst of mutations collapses into one trailing run.
#[derive(Default)]
pub struct ReconciliationScheduler {
    pending: Arc<Mutex<HashMap<UserId, PendingRun>>>,
    next_ticket: AtomicU64,
}

impl ReconciliationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay` unless cancelled or replaced first.
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, user_id: UserId, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let due = Instant::now() + delay;
        let pending = Arc::clone(&self.pending);
        let key = user_id.clone();

        let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            {
                let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
                match map.get(&key) {
                    Some(run) if run.ticket == ticket => {
                        map.remove(&key);
                    }
                    _ => return,
                }
            }
            task.await;
        });
        if let Some(previous) = map.insert(user_id.clone(), PendingRun { ticket, due, handle }) {
            previous.handle.abort();
            debug!(user = %user_id, "replaced pending reconciliation");
        }
    }

    /// Returns true if a pending run was cancelled. A run already past its
    /// delay is not interrupted.
    pub fn cancel(&self, user_id: &UserId) -> bool {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
        match removed {
            Some(run) => {
                run.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<PendingRun> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, run)| run)
            .collect();
        for run in drained {
            run.handle.abort();
        }
    }

    pub fn is_pending(&self, user_id: &UserId) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    pub fn due_at(&self, user_id: &UserId) -> Option<Instant> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|run| run.due)
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_collapses_to_one_trailing_run() {
        let scheduler = ReconciliationScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let alice = UserId::new("alice");
        let delay = Duration::from_millis(2000);
        let start = Instant::now();

        scheduler.schedule(alice.clone(), delay, counting_task(&runs));
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.schedule(alice.clone(), delay, counting_task(&runs));
        let due = scheduler.due_at(&alice).unwrap() - start;
        assert!(due >= Duration::from_millis(2500) && due < Duration::from_millis(2510));

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "first run must have been replaced");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&alice));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_run() {
        let scheduler = ReconciliationScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let alice = UserId::new("alice");

        scheduler.schedule(alice.clone(), Duration::from_secs(1), counting_task(&runs));
        assert!(scheduler.cancel(&alice));
        assert!(!scheduler.cancel(&alice));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn users_are_scheduled_independently() {
        let scheduler = ReconciliationScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(UserId::new("alice"), Duration::from_secs(1), counting_task(&runs));
        scheduler.schedule(UserId::new("bob"), Duration::from_secs(1), counting_task(&runs));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
