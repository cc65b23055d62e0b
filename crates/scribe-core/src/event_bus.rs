//! Typed fan-out event bus.
//!
//! Each event kind gets its own `EventBus<E>`. Subscribing returns a
//! [`Subscription`] handle; dropping the handle (or calling
//! [`Subscription::dispose`]) unregisters the callback. Callbacks run on the
//! emitting task, outside the listener lock, so a callback may subscribe or
//! dispose without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener<E>)>>,
}

/// Multi-subscriber event channel for a single event type.
pub struct EventBus<E> {
    inner: Arc<Listeners<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Listeners {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers a callback and returns the handle that keeps it alive.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push((id, Arc::new(callback)));
        }

        let weak: Weak<Listeners<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut entries) = inner.entries.lock() {
                    entries.retain(|(entry_id, _)| *entry_id != id);
                }
            }
        })
    }

    /// Delivers `event` to every current subscriber in registration order.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = match self.inner.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// The callback stays registered for as long as this handle lives.
#[must_use = "dropping a Subscription immediately unregisters the callback"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Unregisters the callback now.
    pub fn dispose(mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }

    /// Keeps the callback registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.dispose = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}
