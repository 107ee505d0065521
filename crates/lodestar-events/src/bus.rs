//! Synchronous, priority-ordered event bus
//!
//! The bus lives on the host's control thread. It is deliberately `!Send`:
//! other threads feed it through a queue drained on that thread.
//!
//! Dispatch copies the matching subscriptions before invoking anything, so
//! handlers may subscribe, unsubscribe, or publish again while a pass is in
//! progress. A subscription removed mid-pass is skipped for the rest of it; a
//! subscription added mid-pass is first invoked by the next publish.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::event::{Event, EventFilter, EventKind, EventPayload, HostSnapshot};

/// Consecutive faults after which a subscription is dropped
pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

/// Maximum nesting of publish calls made from inside handlers
pub const MAX_DISPATCH_DEPTH: usize = 32;

const FAULT_LOG_CAPACITY: usize = 64;

/// Priority presets; higher runs first
pub mod priority {
    pub const HIGHEST: i32 = 200;
    pub const HIGH: i32 = 100;
    pub const MEDIUM: i32 = 0;
    pub const LOW: i32 = -100;
    pub const LOWEST: i32 = -200;
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Capability implemented by anything that reacts to events
pub trait EventHandler: 'static {
    /// Handle an event. Returning `Err` counts as a fault for this subscription.
    fn handle(&mut self, event: &Event) -> anyhow::Result<()>;
}

struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(&Event) -> anyhow::Result<()> + 'static,
{
    fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// A handler failure caught at the bus boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler {subscription:?} of '{owner}' failed on {kind}: {message}")]
pub struct HandlerFault {
    pub subscription: SubscriptionId,
    pub owner: String,
    pub kind: EventKind,
    pub message: String,
    /// Whether this fault caused the subscription to be removed
    pub removed: bool,
}

struct Subscription {
    id: SubscriptionId,
    owner: String,
    filter: EventFilter,
    priority: i32,
    handler: RefCell<Box<dyn EventHandler>>,
    live: Cell<bool>,
    consecutive_faults: Cell<u32>,
}

struct BusInner {
    /// Sorted by descending priority, ties in registration order
    subscriptions: RefCell<Vec<Rc<Subscription>>>,
    next_id: Cell<u64>,
    next_sequence: Cell<u64>,
    depth: Cell<usize>,
    fault_threshold: Cell<u32>,
    faults: RefCell<VecDeque<HandlerFault>>,
    queued: RefCell<VecDeque<Event>>,
    snapshot: RefCell<Arc<HostSnapshot>>,
}

/// Central publish/subscribe dispatcher
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

/// Restores the dispatch depth even if something unexpected unwinds
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_fault_threshold(DEFAULT_FAULT_THRESHOLD)
    }

    pub fn with_fault_threshold(fault_threshold: u32) -> Self {
        Self {
            inner: Rc::new(BusInner {
                subscriptions: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                next_sequence: Cell::new(0),
                depth: Cell::new(0),
                fault_threshold: Cell::new(fault_threshold.max(1)),
                faults: RefCell::new(VecDeque::new()),
                queued: RefCell::new(VecDeque::new()),
                snapshot: RefCell::new(Arc::new(HostSnapshot::default())),
            }),
        }
    }

    pub fn set_fault_threshold(&self, fault_threshold: u32) {
        self.inner.fault_threshold.set(fault_threshold.max(1));
    }

    /// Subscribe a handler to events matching `filter`
    pub fn subscribe<H: EventHandler>(
        &self,
        filter: impl Into<EventFilter>,
        priority: i32,
        owner: impl Into<String>,
        handler: H,
    ) -> SubscriptionId {
        self.insert(filter.into(), priority, owner.into(), Box::new(handler))
    }

    /// Subscribe a closure to events matching `filter`
    pub fn subscribe_fn<F>(
        &self,
        filter: impl Into<EventFilter>,
        priority: i32,
        owner: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: FnMut(&Event) -> anyhow::Result<()> + 'static,
    {
        self.insert(filter.into(), priority, owner.into(), Box::new(FnHandler(handler)))
    }

    fn insert(
        &self,
        filter: EventFilter,
        priority: i32,
        owner: String,
        handler: Box<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        debug!(target: "events", "Subscribing {:?} for '{}' ({:?}, priority {})", id, owner, filter, priority);

        let subscription = Rc::new(Subscription {
            id,
            owner,
            filter,
            priority,
            handler: RefCell::new(handler),
            live: Cell::new(true),
            consecutive_faults: Cell::new(0),
        });

        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let index = subscriptions.partition_point(|existing| existing.priority >= priority);
        subscriptions.insert(index, subscription);
        id
    }

    /// Remove a subscription. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let Some(index) = subscriptions.iter().position(|s| s.id == id) else {
            return false;
        };
        let removed = subscriptions.remove(index);
        removed.live.set(false);
        debug!(target: "events", "Unsubscribed {:?} of '{}'", id, removed.owner);
        true
    }

    /// Remove every subscription registered under `owner`
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let mut subscriptions = self.inner.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|s| {
            let keep = s.owner != owner;
            if !keep {
                s.live.set(false);
            }
            keep
        });
        before - subscriptions.len()
    }

    /// Drop every subscription and queued event
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.subscriptions.borrow_mut().drain(..).collect();
        for subscription in &drained {
            subscription.live.set(false);
        }
        self.inner.queued.borrow_mut().clear();
        debug!(target: "events", "Cleared {} subscription(s)", drained.len());
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.borrow().iter().any(|s| s.id == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    /// Whether a publish is currently running on this bus
    pub fn is_dispatching(&self) -> bool {
        self.inner.depth.get() > 0
    }

    pub fn snapshot(&self) -> Arc<HostSnapshot> {
        Arc::clone(&self.inner.snapshot.borrow())
    }

    /// Replace the host snapshot attached to events built by this bus
    pub fn set_snapshot(&self, snapshot: HostSnapshot) {
        *self.inner.snapshot.borrow_mut() = Arc::new(snapshot);
    }

    /// Build an event carrying the current snapshot and the next sequence number
    pub fn event(&self, payload: EventPayload) -> Event {
        let sequence = self.inner.next_sequence.get();
        self.inner.next_sequence.set(sequence + 1);
        Event::with_snapshot(payload, self.snapshot(), sequence)
    }

    /// Build and publish an event
    pub fn emit(&self, payload: EventPayload) -> Event {
        let event = self.event(payload);
        self.publish(event)
    }

    /// Invoke every matching handler in priority order and hand the
    /// (possibly cancelled) event back to the caller
    pub fn publish(&self, event: Event) -> Event {
        let depth = self.inner.depth.get();
        if depth >= MAX_DISPATCH_DEPTH {
            error!(
                target: "events",
                "Refusing to publish {} event: dispatch nested {} levels deep",
                event.kind(),
                depth
            );
            return event;
        }

        let kind = event.kind();
        let targets: Vec<Rc<Subscription>> = self
            .inner
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.filter.matches(kind))
            .cloned()
            .collect();

        self.inner.depth.set(depth + 1);
        let _guard = DepthGuard(&self.inner.depth);

        for subscription in targets {
            if !subscription.live.get() {
                continue;
            }

            // A handler further up the stack is publishing re-entrantly
            let Ok(mut handler) = subscription.handler.try_borrow_mut() else {
                debug!(
                    target: "events",
                    "Skipping {:?} of '{}' for nested {} event: handler is already running",
                    subscription.id,
                    subscription.owner,
                    kind
                );
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event)));
            drop(handler);

            let message = match outcome {
                Ok(Ok(())) => {
                    subscription.consecutive_faults.set(0);
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            self.record_fault(&subscription, kind, message);
        }

        event
    }

    fn record_fault(&self, subscription: &Subscription, kind: EventKind, message: String) {
        let faults = subscription.consecutive_faults.get() + 1;
        subscription.consecutive_faults.set(faults);

        let removed = faults >= self.inner.fault_threshold.get() && self.unsubscribe(subscription.id);

        let fault = HandlerFault {
            subscription: subscription.id,
            owner: subscription.owner.clone(),
            kind,
            message,
            removed,
        };

        if removed {
            warn!(target: "events", "{} (removed after {} consecutive faults)", fault, faults);
        } else {
            error!(target: "events", "{}", fault);
        }

        let mut log = self.inner.faults.borrow_mut();
        if log.len() == FAULT_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(fault);
    }

    /// Take the faults recorded since the last call
    pub fn drain_faults(&self) -> Vec<HandlerFault> {
        self.inner.faults.borrow_mut().drain(..).collect()
    }

    /// Queue an event for the next [`EventBus::flush`]
    pub fn enqueue(&self, event: Event) {
        self.inner.queued.borrow_mut().push_back(event);
    }

    pub fn queued_len(&self) -> usize {
        self.inner.queued.borrow().len()
    }

    /// Publish queued events in arrival order. Events queued while flushing
    /// are delivered in the same flush.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inner.queued.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.publish(event);
            delivered += 1;
        }
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("dispatching", &self.is_dispatching())
            .field("queued", &self.queued_len())
            .finish()
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
