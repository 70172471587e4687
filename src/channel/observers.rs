use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::models::message::ChatMessage;

pub type Callback = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Ordered list of message observers.
///
/// Every teardown advances the generation. A connection remembers the
/// generation it was started under and its deliveries are refused once
/// that generation has passed, so callbacks registered after a teardown
/// never see frames from the old link.
#[derive(Default)]
pub struct Observers {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    generation: u64,
    entries: Vec<(u64, Callback)>,
}

impl Observers {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, callback: Callback) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, callback));
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    /// Drop every observer and fence off deliveries from older links.
    pub fn clear(&self) -> u64 {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.generation += 1;
        inner.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every observer in registration order. Returns `false` without
    /// invoking anything when `generation` is stale.
    ///
    /// Callbacks run outside the lock, so a callback may register or remove
    /// observers; such changes apply from the next message on.
    pub fn dispatch(&self, generation: u64, message: &ChatMessage) -> bool {
        let callbacks: Vec<Callback> = {
            let inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            inner.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(message);
        }
        true
    }
}

/// Deregistration handle returned by `Channel::on_message`. Dropping it
/// leaves the observer registered; call `unsubscribe` to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
}

impl Subscription {
    pub(crate) fn new(id: u64, observers: &Arc<Observers>) -> Self {
        Self {
            id,
            observers: Arc::downgrade(observers),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `false` when the observer was already gone, e.g. after a
    /// disconnect cleared the list.
    pub fn unsubscribe(self) -> bool {
        self.observers
            .upgrade()
            .map(|observers| observers.remove(self.id))
            .unwrap_or(false)
    }
}
