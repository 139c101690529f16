use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// An event type that can be published on an [`EventBus`].
///
/// `Kind` is the closed set of event kinds subscribers filter on.
pub trait Notification {
    type Kind: Copy + Eq + Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn FnMut(&E) + Send>;

struct Subscriber<E: Notification> {
    id: SubscriptionId,
    /// `None` receives every kind.
    filter: Option<E::Kind>,
    callback: Callback<E>,
}

/// Registered-callback lists keyed by event kind.
pub struct EventBus<E: Notification> {
    subscribers: Vec<Subscriber<E>>,
    next_id: u64,
}

impl<E: Notification> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a callback for one event kind.
    pub fn subscribe<F>(&mut self, kind: E::Kind, callback: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.register(Some(kind), Box::new(callback))
    }

    /// Register a callback for every event kind.
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.register(None, Box::new(callback))
    }

    fn register(&mut self, filter: Option<E::Kind>, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            callback,
        });
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Deliver an event to every matching subscriber. Returns the delivery count.
    pub fn emit(&mut self, event: &E) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for sub in &mut self.subscribers {
            if sub.filter.is_none_or(|k| k == kind) {
                (sub.callback)(event);
                delivered += 1;
            }
        }
        tracing::trace!(?kind, delivered, "event emitted");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: Notification> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Notification> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Subscriber that keeps a copy of every event it sees.
///
/// Cloning a recorder shares the same underlying log.
#[derive(Debug)]
pub struct Recorder<E> {
    log: Arc<Mutex<Vec<E>>>,
}

impl<E> Clone for Recorder<E> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<E> Default for Recorder<E> {
    fn default() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Notification + Clone + Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this recorder to every event on `bus`.
    pub fn attach(&self, bus: &mut EventBus<E>) -> SubscriptionId {
        let log = Arc::clone(&self.log);
        bus.subscribe_all(move |event: &E| {
            if let Ok(mut log) = log.lock() {
                log.push(event.clone());
            }
        })
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<E> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<E> {
        self.log
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.log.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
