use crate::subscription::{Listener, SubscriptionId, SubscriptionManager};
use std::sync::RwLock;

/// Snapshot-based state holder shared by both stores.
///
/// Readers always get a full clone of the current state, so a snapshot stays
/// consistent no matter what the store does afterwards. Writers replace the
/// whole state in one swap and notify subscribers exactly once per operation,
/// with the new snapshot and the ordered events that produced it.
pub struct DataManager<D, E> {
    data: RwLock<D>,
    subscriptions: SubscriptionManager<D, E>,
}

impl<D: Clone, E> DataManager<D, E> {
    /// Create a data manager holding the given initial state
    pub fn new(data: D) -> Self {
        Self {
            data: RwLock::new(data),
            subscriptions: SubscriptionManager::new(),
        }
    }

    /// A clone of the current state
    pub fn get(&self) -> D {
        self.data.read().expect("data lock poisoned").clone()
    }

    /// Replace the state and notify every subscriber once.
    ///
    /// The lock is released before listeners run.
    pub fn set(&self, data: D, events: Vec<E>) {
        {
            let mut guard = self.data.write().expect("data lock poisoned");
            *guard = data.clone();
        }
        self.subscriptions.notify(&data, &events);
    }

    /// Register a listener for state changes
    pub fn subscribe(&self, listener: Listener<D, E>) -> SubscriptionId {
        self.subscriptions.subscribe(listener)
    }

    /// Remove a previously registered listener
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.subscriptions.unsubscribe(id)
    }
}

impl<D, E> std::fmt::Debug for DataManager<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_get_returns_snapshot() {
        let manager: DataManager<Vec<u32>, ()> = DataManager::new(vec![1, 2]);
        let snapshot = manager.get();
        manager.set(vec![3], vec![]);

        // The earlier snapshot is unaffected by the swap.
        assert_eq!(snapshot, vec![1, 2]);
        assert_eq!(manager.get(), vec![3]);
    }

    #[test]
    fn test_set_notifies_once_with_events() {
        let manager: DataManager<u32, &'static str> = DataManager::new(0);
        let observed: Arc<Mutex<Vec<(u32, Vec<&'static str>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&observed);
        manager.subscribe(Box::new(move |data, events| {
            sink.lock().unwrap().push((*data, events.to_vec()));
        }));

        manager.set(5, vec!["a", "b"]);

        let observed = observed.lock().unwrap();
        assert_eq!(observed.as_slice(), &[(5, vec!["a", "b"])]);
    }

    #[test]
    fn test_unsubscribed_listener_is_not_notified() {
        let manager: DataManager<u32, ()> = DataManager::new(0);
        let observed = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&observed);
        let id = manager.subscribe(Box::new(move |data, _| {
            *sink.lock().unwrap() = *data;
        }));
        manager.unsubscribe(&id);
        manager.set(9, vec![]);

        assert_eq!(*observed.lock().unwrap(), 0);
    }
}
