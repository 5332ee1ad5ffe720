//! # Dispatch Loop
//!
//! The single background worker that drains the async queue.
//!
//! ```text
//! publish_async() ──push──→ [ queue ] ──swap──→ dispatch thread ──→ publish()
//!                   notify ─────┘
//! ```
//!
//! The loop swaps the whole queue out under the lock and delivers outside it,
//! so producers never wait on handler execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::bus::Shared;

/// A message waiting for the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Destination topic.
    pub topic: String,
    /// Message body.
    pub payload: String,
    /// When `publish_async` accepted the message.
    pub enqueued_at: Instant,
}

impl QueuedMessage {
    /// Stamp a message with the current time.
    #[must_use]
    pub fn new(topic: String, payload: String) -> Self {
        Self {
            topic,
            payload,
            enqueued_at: Instant::now(),
        }
    }
}

/// One run of the dispatch thread.
///
/// Every `start` creates a fresh run, so a stop request only ever reaches the
/// thread it was aimed at.
#[derive(Debug, Default)]
pub(crate) struct DispatchRun {
    stop_requested: AtomicBool,
    exited: Mutex<bool>,
    exit_signal: Condvar,
}

impl DispatchRun {
    pub(crate) fn is_active(&self) -> bool {
        !self.stop_requested.load(Ordering::Acquire)
    }

    /// Returns `true` for the first request only.
    pub(crate) fn request_stop(&self) -> bool {
        !self.stop_requested.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn has_exited(&self) -> bool {
        *self.exited.lock()
    }

    /// Block until the run's thread has left the loop.
    pub(crate) fn wait_exited(&self) {
        let mut exited = self.exited.lock();
        while !*exited {
            self.exit_signal.wait(&mut exited);
        }
    }

    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exit_signal.notify_all();
    }
}

/// Marks the run exited however the loop is left.
struct ExitGuard<'a>(&'a DispatchRun);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

/// Body of the dispatch thread. Returns once `run` is asked to stop.
///
/// Messages still queued when the run ends are dropped before the run is
/// reported as exited.
pub(crate) fn dispatch_loop(shared: Arc<Shared>, run: Arc<DispatchRun>) {
    let _exit = ExitGuard(&run);
    debug!("Dispatch loop started");

    'run: loop {
        let batch = {
            let mut queue = shared.queue.lock();
            while queue.is_empty() && run.is_active() {
                // Bounded wait: the stop flag is re-checked at least once per interval.
                let _ = shared
                    .queue_signal
                    .wait_for(&mut queue, shared.config.poll_interval);
            }
            if !run.is_active() {
                break;
            }
            std::mem::take(&mut *queue)
        };

        trace!(batch = batch.len(), "Dispatching queued messages");
        let total = batch.len();
        for (delivered, message) in batch.into_iter().enumerate() {
            if !run.is_active() {
                warn!(
                    dropped = total - delivered,
                    "Dispatch stopped mid-batch; dropping undelivered messages"
                );
                break 'run;
            }
            trace!(
                topic = %message.topic,
                queued_for = ?message.enqueued_at.elapsed(),
                "Delivering queued message"
            );
            shared.deliver(&message.topic, &message.payload);
        }
    }

    let dropped = {
        let mut queue = shared.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    };
    if dropped > 0 {
        warn!(dropped, "Message bus stopped with undelivered messages");
    }
    debug!("Dispatch loop exited");
}
