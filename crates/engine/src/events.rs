use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use stylebook_core::{catalog::Catalog, ids::UserId};

const SIGNAL_CAPACITY: usize = 64;

/// Why the local catalog was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Login,
    Optimistic,
    Rollback,
    Reconciled,
    Refresh,
}

/// Coarse cross-surface notifications. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSignal {
    PossiblyStale { user_id: UserId },
}

pub type CatalogListener = Arc<dyn Fn(&Catalog, ChangeReason) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Publish/subscribe hub owned by one engine instance and handed to whoever
/// needs to observe it.
pub struct CatalogEvents {
    listeners: Mutex<Vec<(ListenerId, CatalogListener)>>,
    next_listener: AtomicU64,
    signals: broadcast::Sender<CatalogSignal>,
}

impl Default for CatalogEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogEvents {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            signals,
        }
    }

    pub fn on_catalog_changed(
        &self,
        listener: impl Fn(&Catalog, ChangeReason) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<CatalogSignal> {
        self.signals.subscribe()
    }

    /// Listeners run on the caller's task, outside any engine lock.
    pub(crate) fn catalog_changed(&self, catalog: &Catalog, reason: ChangeReason) {
        let listeners: Vec<CatalogListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        debug!(?reason, styles = catalog.len(), listeners = listeners.len(), "catalog replaced");
        for listener in listeners {
            listener(catalog, reason);
        }
    }

    pub(crate) fn possibly_stale(&self, user_id: &UserId) {
        // No receivers is fine.
        let _ = self.signals.send(CatalogSignal::PossiblyStale {
            user_id: user_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn removed_listeners_stop_firing() {
        let events = CatalogEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = events.on_catalog_changed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.catalog_changed(&Catalog::fallback(), ChangeReason::Login);
        assert!(events.remove_listener(id));
        events.catalog_changed(&Catalog::fallback(), ChangeReason::Refresh);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!events.remove_listener(id));
    }

    #[tokio::test]
    async fn stale_signal_reaches_subscribers() {
        let events = CatalogEvents::new();
        let mut rx = events.subscribe_signals();
        events.possibly_stale(&UserId::new("alice"));
        assert_eq!(
            rx.recv().await.unwrap(),
            CatalogSignal::PossiblyStale {
                user_id: UserId::new("alice")
            }
        );
    }
}
