//! # Topic Registry
//!
//! Maps topic names to ordered subscriber lists.
//!
//! Every subscription gets an opaque [`SubscriptionId`] so a caller can cancel
//! exactly its own handler. All mutation and lookup goes through one
//! `RwLock`; lookups hand out a snapshot of the handler list so callers never
//! run user code while holding the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Callback invoked with `(topic, payload)` for every delivered message.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync + 'static>;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value (unique per registry, never reused).
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Entry {
    id: SubscriptionId,
    handler: MessageHandler,
}

#[derive(Default)]
struct Inner {
    /// Topic → handlers in insertion order.
    topics: HashMap<String, Vec<Entry>>,
    /// Subscription → owning topic.
    owners: HashMap<SubscriptionId, String>,
}

/// Thread-safe topic → subscriber map.
pub struct TopicRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a handler to the topic's list.
    pub fn subscribe(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.write();
        inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Entry { id, handler });
        inner.owners.insert(id, topic.to_string());

        debug!(topic = %topic, subscription = %id, "Subscription added");
        id
    }

    /// Remove one subscription. Returns `false` if the id is unknown
    /// (already removed, or cleared by [`TopicRegistry::unsubscribe_all`]).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let Some(topic) = inner.owners.remove(&id) else {
            return false;
        };

        let now_empty = match inner.topics.get_mut(&topic) {
            Some(entries) => {
                entries.retain(|entry| entry.id != id);
                entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.topics.remove(&topic);
        }

        debug!(topic = %topic, subscription = %id, "Subscription removed");
        true
    }

    /// Remove every handler on `topic`. Returns how many were removed.
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        let mut inner = self.inner.write();
        let Some(entries) = inner.topics.remove(topic) else {
            return 0;
        };
        for entry in &entries {
            inner.owners.remove(&entry.id);
        }

        debug!(topic = %topic, removed = entries.len(), "All subscriptions cleared");
        entries.len()
    }

    /// Snapshot of the handlers for `topic`, in subscription order.
    #[must_use]
    pub fn handlers(&self, topic: &str) -> Vec<MessageHandler> {
        self.inner
            .read()
            .topics
            .get(topic)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.handler)).collect())
            .unwrap_or_default()
    }

    /// Number of handlers currently subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.read().topics.get(topic).map_or(0, Vec::len)
    }

    /// Total number of live subscriptions across all topics.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.inner.read().owners.len()
    }

    /// Topics with at least one subscriber, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.read().topics.keys().cloned().collect();
        topics.sort();
        topics
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
