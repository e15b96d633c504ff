//! Process-wide notification bus.
//!
//! A single registry guarded by one mutex. `publish` snapshots the matching
//! subscriber list under the lock and invokes handlers after releasing it, so
//! a handler may re-enter the bus (subscribe, unsubscribe, publish) without
//! deadlocking. A panicking handler is caught, logged, and skipped; the
//! fan-out continues to the remaining subscribers.

use crate::NotificationKind;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use tracing::{error, trace};

type Handler = dyn Fn(NotificationKind, &str) + Send + Sync + 'static;

/// Returned by [`NotificationBus::subscribe`]; pass back to
/// [`NotificationBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Entry {
    handle: u64,
    /// Empty set means "all kinds".
    kinds: HashSet<NotificationKind>,
    handler: Arc<Handler>,
}

#[derive(Default)]
struct Registry {
    next_handle: u64,
    entries: Vec<Entry>,
}

/// Thread-safe type-filtered publish/subscribe registry.
#[derive(Default)]
pub struct NotificationBus {
    registry: Mutex<Registry>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a set of kinds; an empty iterator subscribes to all.
    pub fn subscribe<I, F>(&self, kinds: I, handler: F) -> SubscriptionHandle
    where
        I: IntoIterator<Item = NotificationKind>,
        F: Fn(NotificationKind, &str) + Send + Sync + 'static,
    {
        let kinds: HashSet<NotificationKind> = kinds.into_iter().collect();
        let mut registry = self.registry.lock().expect("bus registry poisoned");
        registry.next_handle += 1;
        let handle = registry.next_handle;
        registry.entries.push(Entry {
            handle,
            kinds,
            handler: Arc::new(handler),
        });
        trace!(target: "notify.bus", handle, "subscribe");
        SubscriptionHandle(handle)
    }

    /// Subscribe to every notification kind.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(NotificationKind, &str) + Send + Sync + 'static,
    {
        self.subscribe([], handler)
    }

    /// Returns `true` if the handle was registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut registry = self.registry.lock().expect("bus registry poisoned");
        let before = registry.entries.len();
        registry.entries.retain(|e| e.handle != handle.0);
        let removed = registry.entries.len() != before;
        trace!(target: "notify.bus", handle = handle.0, removed, "unsubscribe");
        removed
    }

    /// Deliver `(kind, data)` to every subscriber whose filter matches.
    ///
    /// Delivery order for a single subscriber follows publish order; no
    /// ordering is guaranteed across subscribers.
    pub fn publish(&self, kind: NotificationKind, data: &str) {
        let matching: Vec<Arc<Handler>> = {
            let registry = self.registry.lock().expect("bus registry poisoned");
            registry
                .entries
                .iter()
                .filter(|e| e.kinds.is_empty() || e.kinds.contains(&kind))
                .map(|e| Arc::clone(&e.handler))
                .collect()
        };
        trace!(
            target: "notify.bus",
            kind = kind.code(),
            subscribers = matching.len(),
            "publish"
        );
        for handler in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(kind, data))).is_err() {
                error!(
                    target: "notify.bus",
                    kind = kind.code(),
                    "subscriber panicked; continuing fan-out"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .expect("bus registry poisoned")
            .entries
            .len()
    }
}
