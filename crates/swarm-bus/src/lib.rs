//! # Swarm Bus - Message Bus for Inter-Module Communication
//!
//! Modules talk to each other and to the host ONLY through this bus.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Module A   │                    │   Module B   │
//! │              │  publish()         │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │ handler(topic, payload)
//!                  │ Message Bus  │          │
//!                  │  (topics)    │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery
//!
//! - **Synchronous:** [`MessageBus::publish`] runs every handler on the
//!   caller's thread, in subscription order.
//! - **Asynchronous:** [`MessageBus::publish_async`] enqueues; one dispatch
//!   thread drains the queue through the same `publish` path. FIFO per
//!   publisher, no ordering across publishers.
//! - **Shutdown is lossy:** messages still queued when the bus stops are
//!   dropped.
//!
//! ## Locking
//!
//! The subscriber map and the async queue have separate locks, so publishers
//! are never serialized behind dispatch work.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod registry;

use std::any::Any;

// Re-export main types
pub use bus::MessageBus;
pub use config::BusConfig;
pub use dispatch::QueuedMessage;
pub use registry::{MessageHandler, SubscriptionId, TopicRegistry};

/// Default upper bound on the dispatch loop's wait, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Name given to the dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "swarm-bus-dispatch";

/// Best-effort text for a caught panic payload.
#[must_use]
pub fn describe_panic(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
