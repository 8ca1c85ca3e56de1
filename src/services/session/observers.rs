use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use super::state::{Commit, Origin};

/// Delivered to observers after a committed state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub origin: Origin,
    pub revision: u64,
}

impl From<Commit> for ChangeEvent {
    fn from(commit: Commit) -> Self {
        Self {
            origin: commit.origin,
            revision: commit.revision,
        }
    }
}

type Callback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

/// Change observers, in registration order
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ObserverRegistry {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, callback: impl Fn(ChangeEvent) + Send + Sync + 'static) -> ObserverHandle {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));

        ObserverHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every observer. Must not be called with the session lock held.
    pub fn notify(&self, event: ChangeEvent) {
        // Snapshot first so a callback may register or drop observers
        let callbacks: Vec<Callback> = self.registry().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps an observer registered; dropping it unregisters
#[must_use = "the observer is removed as soon as the handle is dropped"]
pub struct ObserverHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> ChangeEvent {
        ChangeEvent {
            origin: Origin::LocalMutation,
            revision: 1,
        }
    }

    #[test]
    fn test_notify_reaches_every_observer() {
        let registry = ObserverRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        let _a = registry.register(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = calls.clone();
        let _b = registry.register(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(event());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_handle_unregisters() {
        let registry = ObserverRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let handle = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.len(), 1);

        drop(handle);
        registry.notify(event());
        assert!(registry.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_register_another_observer() {
        let registry = ObserverRegistry::default();
        let inner = registry.clone();
        let held = Arc::new(Mutex::new(Vec::new()));

        let held_in_callback = held.clone();
        let _outer = registry.register(move |_| {
            let handle = inner.register(|_| {});
            held_in_callback.lock().unwrap().push(handle);
        });

        registry.notify(event());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_handle_outliving_registry_is_harmless() {
        let registry = ObserverRegistry::default();
        let handle = registry.register(|_| {});
        drop(registry);
        drop(handle);
    }
}
