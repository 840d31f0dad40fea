use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Value object: subscription token, returned by `subscribe` and consumed by
/// `unsubscribe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// A store listener: receives a full, consistent data snapshot plus the
/// ordered list of semantic changes that produced it within one operation.
pub type Listener<D, E> = Box<dyn Fn(&D, &[E]) + Send + Sync>;

/// Generic publish/subscribe primitive.
///
/// Holds a set of listeners and notifies all of them with `(data, events)` on
/// every change. Listeners are invoked outside the internal lock, so a
/// listener may subscribe or unsubscribe reentrantly.
pub struct SubscriptionManager<D, E> {
    listeners: Mutex<HashMap<Uuid, Arc<Listener<D, E>>>>,
}

impl<D, E> Default for SubscriptionManager<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E> SubscriptionManager<D, E> {
    /// Create an empty subscription manager
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener, returning its subscription token
    pub fn subscribe(&self, listener: Listener<D, E>) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .expect("subscription lock poisoned")
            .insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Remove a listener; unknown tokens are ignored
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.listeners
            .lock()
            .expect("subscription lock poisoned")
            .remove(&id.0);
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .expect("subscription lock poisoned")
            .len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every listener with the given snapshot and event list
    pub fn notify(&self, data: &D, events: &[E]) {
        let listeners: Vec<Arc<Listener<D, E>>> = self
            .listeners
            .lock()
            .expect("subscription lock poisoned")
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            listener(data, events);
        }
    }
}

impl<D, E> std::fmt::Debug for SubscriptionManager<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_all_listeners() {
        let manager: SubscriptionManager<u32, &'static str> = SubscriptionManager::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first_count = Arc::clone(&first);
        manager.subscribe(Box::new(move |data, events| {
            assert_eq!(*data, 7);
            assert_eq!(events, ["changed"]);
            first_count.fetch_add(1, Ordering::SeqCst);
        }));

        let second_count = Arc::clone(&second);
        manager.subscribe(Box::new(move |_, _| {
            second_count.fetch_add(1, Ordering::SeqCst);
        }));

        manager.notify(&7, &["changed"]);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let manager: SubscriptionManager<u32, ()> = SubscriptionManager::new();
        let count = Arc::new(AtomicUsize::new(0));

        let listener_count = Arc::clone(&count);
        let id = manager.subscribe(Box::new(move |_, _| {
            listener_count.fetch_add(1, Ordering::SeqCst);
        }));

        manager.notify(&1, &[]);
        manager.unsubscribe(&id);
        manager.notify(&2, &[]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_token_is_noop() {
        let manager: SubscriptionManager<u32, ()> = SubscriptionManager::new();
        let stale = manager.subscribe(Box::new(|_, _| {}));
        manager.unsubscribe(&stale);
        manager.unsubscribe(&stale);
        assert_eq!(manager.len(), 0);
    }
}
