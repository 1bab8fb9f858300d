//! EventDispatcher: fans decoded control events out to subscribers.
//!
//! Every connection task calls [`EventDispatcher::dispatch`] for each key
//! command it decodes.  The dispatcher copies the event into one bounded queue
//! per [`Subscription`].  Publishing never waits on a subscriber: when a queue
//! is full its oldest event is evicted and counted as dropped.
//!
//! # One queue per subscriber (for beginners)
//!
//! A single shared channel would let one slow consumer stall the control
//! server, because the sender would have to wait for space.  With a private
//! ring buffer per subscriber, a slow consumer only loses its *own* oldest
//! events while everyone else keeps up:
//!
//! ```text
//! connection A ─┐                 ┌─► [ring: cap 100] ─► forwarder ─► sink
//!               ├─► dispatch() ───┤
//! connection B ─┘                 └─► [ring: cap 100] ─► test / logger
//! ```
//!
//! # Ordering
//!
//! Fan-out happens while the subscriber list is locked, so all subscribers see
//! events in the same relative order, and events from one connection arrive in
//! the order that connection decoded them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use ecp_core::ControlEvent;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of events buffered per subscriber.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default topic under which events are published to the host.
pub const DEFAULT_TOPIC: &str = "roku_command";

/// Error returned by an [`EventSink`] when an event could not be published.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing to the underlying output failed.
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),

    /// The host refused the event.
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Destination for control events leaving the emulator.
///
/// The binary publishes to stdout; a host integration would implement this
/// trait over its own event bus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one event under `topic`.
    async fn publish(&self, topic: &str, event: &ControlEvent) -> Result<(), SinkError>;
}

// ── Subscriber queue ──────────────────────────────────────────────────────────

struct SubscriberQueue {
    id: u64,
    capacity: usize,
    events: Mutex<VecDeque<ControlEvent>>,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl SubscriberQueue {
    /// Appends `event`, evicting the oldest entry when full.
    ///
    /// Returns `true` when an event was evicted.
    fn push(&self, event: ControlEvent) -> bool {
        let evicted = {
            let mut events = lock(&self.events);
            let evicted = if events.len() >= self.capacity {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            } else {
                false
            };
            events.push_back(event);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    fn pop(&self) -> Option<ControlEvent> {
        lock(&self.events).pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

struct DispatcherInner {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Multi-producer fan-out of [`ControlEvent`]s into bounded subscriber queues.
///
/// Cloning is cheap; all clones share the same subscribers and counters.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    /// Creates a dispatcher whose subscribers buffer at most `capacity` events.
    ///
    /// A capacity of zero is raised to one so the newest event is always kept.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
                dispatched: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Per-subscriber queue capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Registers a new subscriber.
    ///
    /// The subscription only sees events dispatched after this call.  On a
    /// closed dispatcher the subscription is born closed and yields nothing.
    pub fn subscribe(&self) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            capacity: self.inner.capacity,
            events: Mutex::new(VecDeque::with_capacity(self.inner.capacity)),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        });

        {
            let mut subscribers = lock(&self.inner.subscribers);
            if self.inner.closed.load(Ordering::Acquire) {
                queue.close();
            } else {
                subscribers.push(Arc::clone(&queue));
            }
        }

        debug!(subscriber = queue.id, "subscriber registered");
        Subscription {
            queue,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every current subscriber without waiting.
    ///
    /// With no subscribers the event is discarded.  After [`close`] the call
    /// is a no-op.
    ///
    /// [`close`]: EventDispatcher::close
    pub fn dispatch(&self, event: ControlEvent) {
        let subscribers = lock(&self.inner.subscribers);
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(key = %event.key, "dispatcher closed; event discarded");
            return;
        }
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);

        let Some((last, rest)) = subscribers.split_last() else {
            return;
        };
        for queue in rest {
            if queue.push(event.clone()) {
                self.record_drop(queue.id);
            }
        }
        if last.push(event) {
            self.record_drop(last.id);
        }
    }

    fn record_drop(&self, subscriber: u64) {
        let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(subscriber, total, "subscriber queue full; oldest event dropped");
    }

    /// Number of events accepted by [`dispatch`](EventDispatcher::dispatch).
    pub fn dispatched_total(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }

    /// Number of events evicted across all subscribers.
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stops accepting events and wakes every subscriber.
    ///
    /// Subscribers still drain what is already queued; afterwards
    /// [`Subscription::recv`] returns `None`.  Idempotent.
    pub fn close(&self) {
        let subscribers = {
            let mut subscribers = lock(&self.inner.subscribers);
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *subscribers)
        };
        for queue in &subscribers {
            queue.close();
        }
        info!(
            subscribers = subscribers.len(),
            dispatched = self.dispatched_total(),
            dropped = self.dropped_total(),
            "event dispatcher closed"
        );
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// The receiving end of one subscriber queue.
///
/// Dropping the subscription unregisters it from the dispatcher.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
    dispatcher: Weak<DispatcherInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.queue.id
    }

    /// Waits for the next event in FIFO order.
    ///
    /// Returns `None` once the dispatcher is closed and the queue is empty.
    pub async fn recv(&self) -> Option<ControlEvent> {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Takes the next queued event without waiting.
    pub fn try_recv(&self) -> Option<ControlEvent> {
        self.queue.pop()
    }

    /// Events currently buffered.
    pub fn len(&self) -> usize {
        lock(&self.queue.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events evicted from this subscriber's queue because it was full.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.dispatcher.upgrade() {
            lock(&inner.subscribers).retain(|q| !Arc::ptr_eq(q, &self.queue));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.queue.id)
            .field("queued", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// Spawns a task that publishes every event from `subscription` to `sink`.
///
/// Sink failures are logged and the event is skipped; the forwarder keeps
/// running.  The task ends once the dispatcher is closed and the queue has
/// drained, returning the number of events published successfully.
pub fn spawn_forwarder(
    subscription: Subscription,
    sink: Arc<dyn EventSink>,
    topic: impl Into<String>,
) -> JoinHandle<u64> {
    let topic = topic.into();
    tokio::spawn(async move {
        let mut published = 0u64;
        while let Some(event) = subscription.recv().await {
            match sink.publish(&topic, &event).await {
                Ok(()) => published += 1,
                Err(e) => warn!(
                    topic = %topic,
                    key = %event.key,
                    "failed to publish control event: {e}"
                ),
            }
        }
        debug!(subscriber = subscription.id(), published, "forwarder stopped");
        published
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
