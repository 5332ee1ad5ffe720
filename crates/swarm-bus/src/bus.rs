//! # Message Bus
//!
//! Owns the [`TopicRegistry`] and the async delivery queue.
//!
//! - `publish` delivers synchronously on the caller's thread.
//! - `publish_async` enqueues and returns; the dispatch thread later delivers
//!   through the same path, so both share one set of delivery semantics.
//!
//! A panicking handler is caught and logged. It never prevents delivery to the
//! remaining handlers, never reaches the publisher, and never kills the
//! dispatch thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::BusConfig;
use crate::dispatch::{dispatch_loop, DispatchRun, QueuedMessage};
use crate::registry::{MessageHandler, SubscriptionId, TopicRegistry};
use crate::{describe_panic, DISPATCH_THREAD_NAME};

/// State shared between the bus handle and its dispatch thread.
pub(crate) struct Shared {
    pub(crate) registry: TopicRegistry,
    pub(crate) queue: Mutex<Vec<QueuedMessage>>,
    pub(crate) queue_signal: Condvar,
    pub(crate) config: BusConfig,
    messages_delivered: AtomicU64,
}

impl Shared {
    /// Fan out one message to every handler on `topic`, in subscription order.
    pub(crate) fn deliver(&self, topic: &str, payload: &str) -> usize {
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let handlers = self.registry.handlers(topic);

        for (index, handler) in handlers.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(topic, payload)));
            if let Err(cause) = outcome {
                error!(
                    topic = %topic,
                    handler = index,
                    error = %describe_panic(cause.as_ref()),
                    "Message handler panicked"
                );
            }
        }

        self.messages_delivered.fetch_add(1, Ordering::AcqRel);
        debug!(topic = %topic, receivers = handlers.len(), "Message published");
        handlers.len()
    }
}

/// The current dispatch run and its thread.
///
/// Stays in the slot until some `stop` or `start` has seen the run exit, so
/// late callers can still wait on it.
struct Worker {
    run: Arc<DispatchRun>,
    thread: ThreadId,
    /// Taken by the one `stop` that joins.
    handle: Option<JoinHandle<()>>,
}

/// In-process publish/subscribe bus with one background dispatch thread.
pub struct MessageBus {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

impl MessageBus {
    /// Create a stopped bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a stopped bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: TopicRegistry::new(),
                queue: Mutex::new(Vec::new()),
                queue_signal: Condvar::new(),
                config,
                messages_delivered: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Subscribe a handler to `topic`.
    ///
    /// Returns the id to pass to [`MessageBus::unsubscribe`].
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.subscribe_handler(topic, Arc::new(handler))
    }

    /// Subscribe an already shared handler.
    pub fn subscribe_handler(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        self.shared.registry.subscribe(topic, handler)
    }

    /// Cancel exactly one subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.registry.unsubscribe(id)
    }

    /// Drop every handler on `topic`.
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        self.shared.registry.unsubscribe_all(topic)
    }

    /// Deliver synchronously. Returns the number of handlers invoked.
    ///
    /// Blocks for as long as the handlers run.
    pub fn publish(&self, topic: &str, payload: &str) -> usize {
        self.shared.deliver(topic, payload)
    }

    /// Queue a message for the dispatch thread and return immediately.
    ///
    /// Messages queued before [`MessageBus::start`] wait until the bus starts.
    pub fn publish_async(&self, topic: impl Into<String>, payload: impl Into<String>) {
        let message = QueuedMessage::new(topic.into(), payload.into());
        self.shared.queue.lock().push(message);
        self.shared.queue_signal.notify_one();
    }

    /// Spawn the dispatch thread. No-op if it is already running.
    ///
    /// If a previous run is still exiting, waits for it first so two dispatch
    /// threads never drain the queue at once.
    pub fn start(&self) {
        loop {
            let previous = {
                let mut worker = self.worker.lock();
                let exiting = match worker.as_ref() {
                    Some(current) if current.run.is_active() => return,
                    Some(current) if !current.run.has_exited() => {
                        if current.thread == thread::current().id() {
                            warn!("Message bus restarted from its own stopping dispatch thread; ignoring");
                            return;
                        }
                        Some(Arc::clone(&current.run))
                    }
                    _ => None,
                };
                match exiting {
                    Some(run) => run,
                    None => {
                        *worker = self.spawn_worker();
                        return;
                    }
                }
            };

            debug!("Waiting for the previous dispatch run to exit");
            previous.wait_exited();
            let mut worker = self.worker.lock();
            if worker
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(&current.run, &previous))
            {
                *worker = None;
            }
        }
    }

    fn spawn_worker(&self) -> Option<Worker> {
        let run = Arc::new(DispatchRun::default());
        let spawned = {
            let (shared, run) = (Arc::clone(&self.shared), Arc::clone(&run));
            thread::Builder::new()
                .name(DISPATCH_THREAD_NAME.to_string())
                .spawn(move || dispatch_loop(shared, run))
        };

        match spawned {
            Ok(handle) => {
                info!("Message bus started");
                Some(Worker {
                    run,
                    thread: handle.thread().id(),
                    handle: Some(handle),
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn dispatch thread");
                None
            }
        }
    }

    /// Stop the dispatch thread and wait for it to exit.
    ///
    /// Idempotent. Messages still queued are dropped. Every caller returns
    /// only after the run has exited, except the dispatch thread itself,
    /// which cannot wait on its own loop.
    pub fn stop(&self) {
        let (run, handle) = {
            let mut worker = self.worker.lock();
            let Some(current) = worker.as_mut() else {
                return;
            };
            if current.run.request_stop() {
                debug!("Dispatch stop requested");
            }
            if current.thread == thread::current().id() {
                drop(worker);
                self.wake_dispatcher();
                warn!("Message bus stopped from its own dispatch thread; not joining");
                return;
            }
            (Arc::clone(&current.run), current.handle.take())
        };

        self.wake_dispatcher();

        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Dispatch thread terminated by panic");
                }
            }
            None => run.wait_exited(),
        }

        let mut worker = self.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.run, &run))
        {
            *worker = None;
            info!("Message bus stopped");
        }
    }

    fn wake_dispatcher(&self) {
        // Notify under the queue lock so the loop cannot miss the wakeup
        // between its stop-flag check and its wait.
        let _queue = self.shared.queue.lock();
        self.shared.queue_signal.notify_all();
    }

    /// Whether the dispatch thread is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|current| current.run.is_active())
    }

    /// Total publishes delivered (sync plus drained async).
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.shared.messages_delivered.load(Ordering::Acquire)
    }

    /// Number of handlers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.registry.subscriber_count(topic)
    }

    /// Messages waiting for the dispatch thread.
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Topics with at least one subscriber, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.shared.registry.topics()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.stop();
    }
}
