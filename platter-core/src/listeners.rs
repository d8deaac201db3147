//! Callback registry for change notifications.
//!
//! Listeners are invoked synchronously, in subscription order, after the
//! emitter has released its own locks. A [`Subscription`] removes its
//! listener when dropped or explicitly unsubscribed.

use std::sync::{Arc, RwLock, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerTable<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// A set of listeners for events of type `E`.
pub struct Listeners<E> {
    table: Arc<RwLock<ListenerTable<E>>>,
}

impl<E: 'static> Listeners<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(ListenerTable {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(listener)));
        drop(table);

        let weak: Weak<RwLock<ListenerTable<E>>> = Arc::downgrade(&self.table);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(table) = weak.upgrade() {
                    let mut table = table.write().unwrap_or_else(|e| e.into_inner());
                    table.entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Deliver `event` to every listener. Returns how many were called.
    pub fn emit(&self, event: &E) -> usize {
        let callbacks: Vec<Callback<E>> = {
            let table = self.table.read().unwrap_or_else(|e| e.into_inner());
            table.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the listener registered for the lifetime of the emitter.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
