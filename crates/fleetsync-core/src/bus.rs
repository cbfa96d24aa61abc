//! Typed publish/subscribe registry.
//!
//! The bus decouples the connection manager (the only producer) from its
//! consumers. Handlers are plain callbacks keyed by [`EventCategory`]; they
//! run synchronously, in subscription order, on the task that publishes.
//! Events are not buffered: publishing to a category with no subscribers is
//! a no-op.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, trace};

use fleetsync_api::{EventCategory, InboundMessage};

// ── Event ────────────────────────────────────────────────────────────

/// One event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub category: EventCategory,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(category: EventCategory, data: Value) -> Self {
        Self {
            category,
            data,
            timestamp: Utc::now(),
        }
    }
}

impl From<InboundMessage> for Event {
    fn from(msg: InboundMessage) -> Self {
        Self {
            category: msg.category,
            data: msg.data,
            timestamp: msg.timestamp,
        }
    }
}

// ── EventBus ─────────────────────────────────────────────────────────

/// Callback invoked for every event of the subscribed category.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

/// Category-keyed dispatch table.
///
/// Always held behind an `Arc`; [`Subscription`] handles keep only a weak
/// reference, so a handle outliving its bus is harmless.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: DashMap<EventCategory, Vec<Entry>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for `category`.
    ///
    /// The returned [`Subscription`] removes exactly this handler when
    /// [`unsubscribe`](Subscription::unsubscribe) is called.
    pub fn subscribe<F>(self: &Arc<Self>, category: EventCategory, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.entry(category).or_default().push(Entry {
            id,
            handler: Arc::new(handler),
        });
        trace!(%category, id, "subscribed");

        Subscription {
            bus: Arc::downgrade(self),
            category,
            id,
        }
    }

    /// Deliver `event` to every current subscriber of its category, in
    /// subscription order. Returns how many handlers completed.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still run.
    pub fn publish(&self, event: &Event) -> usize {
        // Snapshot first: handlers may subscribe or unsubscribe re-entrantly.
        let handlers: Vec<Handler> = match self.handlers.get(&event.category) {
            Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
            None => Vec::new(),
        };

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        category = %event.category,
                        panic = panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of live handlers for `category`.
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.handlers.get(&category).map_or(0, |entries| entries.len())
    }

    fn remove(&self, category: EventCategory, id: u64) -> bool {
        let Some(mut entries) = self.handlers.get_mut(&category) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        before != entries.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.handlers {
            map.entry(entry.key(), &entry.value().len());
        }
        map.finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// ── Subscription ─────────────────────────────────────────────────────

/// Capability to remove one handler from the bus.
///
/// Dropping the handle leaves the handler registered; teardown is always an
/// explicit [`unsubscribe`](Self::unsubscribe) call.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<EventBus>,
    category: EventCategory,
    id: u64,
}

impl Subscription {
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Remove the handler. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.category, self.id) {
                trace!(category = %self.category, id = self.id, "unsubscribed");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
