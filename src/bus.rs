//! Per-kind publish/subscribe for decoded events.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::HandlerError;
use crate::event::{Event, EventKind};

/// A bus subscriber. Runs on the shard task that published the event, so it
/// should hand long work off to a spawned task.
pub type Handler = Arc<dyn Fn(Arc<Event>) -> Result<(), HandlerError> + Send + Sync>;

/// Identifies one subscription; pass it back to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    kind: EventKind,
    id: u64,
}

impl SubscriptionToken {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    handler: Handler,
}

/// Routes each published event to the handlers registered for its kind.
///
/// Each kind has its own subscriber list behind its own lock. Publishing
/// clones the list's `Arc` and calls the handlers with no lock held, so a
/// handler may subscribe or unsubscribe without deadlocking.
pub struct EventBus {
    table: Box<[RwLock<Arc<Vec<Subscriber>>>]>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            table: (0..EventKind::COUNT)
                .map(|_| RwLock::new(Arc::new(Vec::new())))
                .collect(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(Arc<Event>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_handler(kind, Arc::new(handler))
    }

    fn subscribe_handler(&self, kind: EventKind, handler: Handler) -> SubscriptionToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut list = self.table[kind.index()].write();
        Arc::make_mut(&mut list).push(Subscriber { id, handler });
        SubscriptionToken { kind, id }
    }

    /// Registers one handler for every kind.
    pub fn subscribe_all<F>(&self, handler: F) -> Vec<SubscriptionToken>
    where
        F: Fn(Arc<Event>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        EventKind::ALL
            .iter()
            .map(|kind| self.subscribe_handler(*kind, handler.clone()))
            .collect()
    }

    /// Returns `false` when the token was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut list = self.table[token.kind.index()].write();
        let Some(position) = list.iter().position(|s| s.id == token.id) else {
            return false;
        };
        Arc::make_mut(&mut list).remove(position);
        true
    }

    /// Calls every handler subscribed to the event's kind, in subscription
    /// order. Returns how many handlers completed without error.
    ///
    /// A failing or panicking handler is logged and skipped; the rest still
    /// run.
    pub fn publish(&self, event: Arc<Event>) -> usize {
        let kind = event.kind();
        let subscribers = self.table[kind.index()].read().clone();
        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event.clone())));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => log::error!("{:?} handler #{} failed: {}", kind, subscriber.id, e),
                Err(_) => log::error!("{:?} handler #{} panicked", kind, subscriber.id),
            }
        }
        delivered
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.table[kind.index()].read().len()
    }

    pub fn clear(&self) {
        for list in self.table.iter() {
            *list.write() = Arc::new(Vec::new());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribed: usize = self.table.iter().map(|list| list.read().len()).sum();
        f.debug_struct("EventBus")
            .field("subscribers", &subscribed)
            .finish()
    }
}
