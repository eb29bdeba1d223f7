//! Observer-based event bus
//!
//! Subscribers are kept in a copy-on-write list: `publish` reads the
//! current snapshot without locking, and subscribing swaps in a new list.
//! Observers run synchronously in subscription order on the publisher's
//! task. An observer that returns an error or panics is logged and the
//! remaining observers still run.

use arc_swap::ArcSwap;
use mesh_domain::MeshEvent;
use mesh_domain::ports::{MeshObserver, ObserverRole};
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

/// Name and role of a subscribed observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverInfo {
    pub name: String,
    pub role: ObserverRole,
}

/// Event bus with a bounded history ring
pub struct EventBus {
    observers: ArcSwap<Vec<Arc<dyn MeshObserver>>>,
    history: Mutex<VecDeque<MeshEvent>>,
    history_capacity: usize,
    published: AtomicU64,
    observer_failures: AtomicU64,
}

impl EventBus {
    /// Create a bus retaining up to `history_capacity` events
    pub fn new(history_capacity: usize) -> Self {
        Self {
            observers: ArcSwap::from_pointee(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
            history_capacity,
            published: AtomicU64::new(0),
            observer_failures: AtomicU64::new(0),
        }
    }

    /// Append an observer; it receives every event published afterwards
    pub fn subscribe(&self, observer: Arc<dyn MeshObserver>) {
        self.observers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&observer));
            next
        });
    }

    /// Remove every observer named `name`; true if any was removed
    pub fn unsubscribe(&self, name: &str) -> bool {
        let previous = self.observers.rcu(|current| {
            current
                .iter()
                .filter(|o| o.name() != name)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|o| o.name() == name)
    }

    /// Subscribed observers in delivery order
    pub fn observers(&self) -> Vec<ObserverInfo> {
        self.observers
            .load()
            .iter()
            .map(|o| ObserverInfo {
                name: o.name().to_string(),
                role: o.role(),
            })
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.load().len()
    }

    /// Deliver `event` to every observer; returns how many handled it without error
    pub fn publish(&self, event: MeshEvent) -> usize {
        let observers = self.observers.load_full();
        let mut delivered = 0;

        for observer in observers.iter() {
            match catch_unwind(AssertUnwindSafe(|| observer.update(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.observer_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        observer = observer.name(),
                        event = event.name(),
                        error = %e,
                        "Observer failed to handle event"
                    );
                }
                Err(_) => {
                    self.observer_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        observer = observer.name(),
                        event = event.name(),
                        "Observer panicked while handling event"
                    );
                }
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.remember(event);
        delivered
    }

    fn remember(&self, event: MeshEvent) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Most recent events, oldest first; at most `limit` when given
    pub fn history(&self, limit: Option<usize>) -> Vec<MeshEvent> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = limit.map_or(0, |limit| history.len().saturating_sub(limit));
        history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Events published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Observer errors and panics swallowed since creation
    pub fn observer_failure_count(&self) -> u64 {
        self.observer_failures.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::constants::EVENT_HISTORY_CAPACITY)
    }
}
