// Observer list used for status-change and log-line subscriptions.
// Delivery is synchronous, in registration order; a panicking observer is
// logged and skipped so the remaining observers still receive the event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ObserverList<T> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T> ObserverList<T> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        })
    }

    // Callbacks run outside the lock, so a poisoned list still holds consistent entries.
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Callback<T>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, Arc::new(callback)));
        Subscription {
            id,
            list: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|(entry_id, _)| *entry_id != id);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every observer with `event`. The list is snapshotted first, so observers
    /// may subscribe or unsubscribe from inside a callback.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self.entries().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(observers = self.name, "observer panicked; continuing delivery");
            }
        }
    }
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to stop delivery.
/// Dropping the handle keeps the observer registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription<T> {
    id: u64,
    list: Weak<ObserverList<T>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }
}
