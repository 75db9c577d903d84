//! In-process change notifications.
//!
//! The repository publishes one [`ChangeKind`] after every committed mutation;
//! views subscribe and re-read. Delivery is synchronous on the publishing
//! thread. The subscriber list is snapshotted before callbacks run, so a
//! callback may subscribe or unsubscribe (itself or others) without
//! deadlocking, and an unsubscribe that races a publish never tears the list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

/// Which table a committed mutation touched. Subscribers re-read that table
/// rather than receiving the changed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Users,
    Statuses,
    Pieces,
}

type Callback = Arc<dyn Fn(ChangeKind) + Send + Sync>;

struct Listener {
    id: u64,
    kind: ChangeKind,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Listener>>,
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    kind: ChangeKind,
}

impl Subscription {
    /// The change kind this subscription listens to.
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
}

/// Publish/subscribe hub owned by the application root. Clones share the same
/// subscriber set.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every future publish of `kind`. The callback runs
    /// on whichever thread publishes, so it must be `Send + Sync`. Keep the
    /// returned handle to unsubscribe later.
    pub fn subscribe<F>(&self, kind: ChangeKind, callback: F) -> Subscription
    where
        F: Fn(ChangeKind) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                id,
                kind,
                callback: Arc::new(callback),
            });
        Subscription { id, kind }
    }

    /// Remove a subscription. Returns `false` when it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|listener| listener.id != subscription.id);
        listeners.len() != before
    }

    /// Invoke every subscriber of `kind` and return how many were called.
    pub fn publish(&self, kind: ChangeKind) -> usize {
        let callbacks: Vec<Callback> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| Arc::clone(&listener.callback))
            .collect();

        trace!(?kind, subscribers = callbacks.len(), "publishing change");
        for callback in &callbacks {
            callback(kind);
        }
        callbacks.len()
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: ChangeKind) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|listener| listener.kind == kind)
            .count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("users", &self.subscriber_count(ChangeKind::Users))
            .field("statuses", &self.subscriber_count(ChangeKind::Statuses))
            .field("pieces", &self.subscriber_count(ChangeKind::Pieces))
            .finish()
    }
}
