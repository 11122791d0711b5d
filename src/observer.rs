//! Change notifications around a swap.
//!
//! Observers are held weakly: the hub never keeps an observer alive. A
//! subscription whose observer has been dropped is pruned on the next
//! broadcast, so forgetting to unsubscribe leaks only the small entry until
//! then. Callbacks run synchronously on the swapping thread, outside the
//! hub's lock, so an observer may subscribe or unsubscribe from a callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::container::Container;

/// Receives container change events. Both methods default to no-ops.
pub trait ContainerObserver: Send + Sync {
    /// Called before any content moves. `from` is `None` when the outgoing
    /// container is not in the registry.
    fn will_change(&self, _from: Option<&Container>, _to: &Container) {}

    /// Called after the incoming container is live and recorded as active
    fn did_change(&self, _from: Option<&Container>, _to: &Container) {}
}

/// Token returned by [`ObserverHub::subscribe`]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

struct Entry {
    id: u64,
    observer: Weak<dyn ContainerObserver>,
}

#[derive(Default)]
pub struct ObserverHub {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer without taking ownership of it
    pub fn subscribe(&self, observer: &Arc<dyn ContainerObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Entry {
            id,
            observer: Arc::downgrade(observer),
        });
        Subscription { id }
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != subscription.id);
        entries.len() != before
    }

    /// Number of live observers
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|entry| entry.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_observers(&self) -> Vec<Arc<dyn ContainerObserver>> {
        let mut entries = self.lock();
        entries.retain(|entry| entry.observer.strong_count() > 0);
        entries
            .iter()
            .filter_map(|entry| entry.observer.upgrade())
            .collect()
    }

    pub fn will_change(&self, from: Option<&Container>, to: &Container) {
        for observer in self.live_observers() {
            observer.will_change(from, to);
        }
    }

    pub fn did_change(&self, from: Option<&Container>, to: &Container) {
        for observer in self.live_observers() {
            observer.did_change(from, to);
        }
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ContainerObserver for Recorder {
        fn will_change(&self, from: Option<&Container>, to: &Container) {
            self.events.lock().unwrap().push(format!(
                "will:{}->{}",
                from.map(Container::uuid).unwrap_or("-"),
                to.uuid()
            ));
        }

        fn did_change(&self, _from: Option<&Container>, to: &Container) {
            self.events.lock().unwrap().push(format!("did:{}", to.uuid()));
        }
    }

    fn container(uuid: &str) -> Container {
        Container::new(uuid.to_string(), None, None)
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let hub = ObserverHub::new();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn ContainerObserver> = recorder.clone();
        let _subscription = hub.subscribe(&observer);

        let (a, b) = (container("a"), container("b"));
        hub.will_change(Some(&a), &b);
        hub.did_change(Some(&a), &b);

        assert_eq!(*recorder.events.lock().unwrap(), vec!["will:a->b", "did:b"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = ObserverHub::new();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn ContainerObserver> = recorder.clone();
        let subscription = hub.subscribe(&observer);

        assert!(hub.unsubscribe(subscription));
        hub.did_change(None, &container("b"));
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let hub = ObserverHub::new();
        let observer: Arc<dyn ContainerObserver> = Arc::new(Recorder::default());
        let subscription = hub.subscribe(&observer);
        assert_eq!(hub.len(), 1);

        drop(observer);
        hub.did_change(None, &container("b"));
        assert_eq!(hub.len(), 0);
        assert!(!hub.unsubscribe(subscription));
    }
}
