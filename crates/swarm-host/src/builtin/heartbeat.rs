//! Heartbeat module: a worker thread that publishes a tick on the bus at a
//! fixed interval.
//!
//! ## Config
//!
//! - `interval_ms` (default 1000, must be > 0)
//! - `max_beats` (optional): request host shutdown after this many ticks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use swarm_bus::MessageBus;
use swarm_telemetry::log_event;
use tracing::{debug, info, warn};

use crate::module::{HostHandle, Module, ModuleConfig, ModuleContext, ModuleError};

pub const NAME: &str = "heartbeat";

/// Topic every tick is published on.
pub const TICK_TOPIC: &str = "heartbeat.tick";

pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Payload of a [`TICK_TOPIC`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// 1-based sequence number.
    pub seq: u64,
    pub module: String,
}

/// Stop flag + wake-up for the worker's timed wait.
type StopSignal = Arc<(Mutex<bool>, Condvar)>;

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

pub struct HeartbeatModule {
    bus: Option<Arc<MessageBus>>,
    host: Option<HostHandle>,
    interval: Duration,
    max_beats: Option<u64>,
    initialized: bool,
    beats: Arc<AtomicU64>,
    worker: Option<Worker>,
}

impl HeartbeatModule {
    pub fn new() -> Self {
        Self {
            bus: None,
            host: None,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            max_beats: None,
            initialized: false,
            beats: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Ticks published so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for HeartbeatModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for HeartbeatModule {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn attach(&mut self, ctx: ModuleContext) {
        self.bus = Some(ctx.bus);
        self.host = Some(ctx.host);
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ModuleError> {
        let interval_ms = config.parse_or("interval_ms", DEFAULT_INTERVAL_MS)?;
        if interval_ms == 0 {
            return Err(ModuleError::InvalidConfig {
                key: "interval_ms".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.interval = Duration::from_millis(interval_ms);
        self.max_beats = config.parse::<u64>("max_beats")?.filter(|&n| n > 0);
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), ModuleError> {
        if self.bus.is_none() {
            return Err(ModuleError::Initialization(
                "message bus not attached".to_string(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), ModuleError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (Some(bus), true) = (self.bus.clone(), self.initialized) else {
            return Err(ModuleError::Start("module not initialized".to_string()));
        };

        let stop: StopSignal = Arc::new((Mutex::new(false), Condvar::new()));
        let beat = Beat {
            bus,
            host: self.host.clone(),
            interval: self.interval,
            max_beats: self.max_beats,
            beats: Arc::clone(&self.beats),
            stop: Arc::clone(&stop),
        };
        let handle = thread::Builder::new()
            .name(NAME.to_string())
            .spawn(move || beat.run())
            .map_err(|e| ModuleError::Start(format!("failed to spawn worker: {e}")))?;

        self.worker = Some(Worker { stop, handle });
        log_event!(
            info,
            NAME,
            "Heartbeat started",
            interval = ?self.interval
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        {
            let (lock, cvar) = &*worker.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        worker
            .handle
            .join()
            .map_err(|_| ModuleError::Stop("heartbeat worker panicked".to_string()))?;
        log_event!(info, NAME, "Heartbeat stopped", beats = self.beats());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn status(&self) -> String {
        format!(
            "Heartbeat (running: {}, beats: {}, interval: {}ms)",
            if self.is_running() { "yes" } else { "no" },
            self.beats(),
            self.interval.as_millis()
        )
    }
}

impl Drop for HeartbeatModule {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// State moved into the worker thread.
struct Beat {
    bus: Arc<MessageBus>,
    host: Option<HostHandle>,
    interval: Duration,
    max_beats: Option<u64>,
    beats: Arc<AtomicU64>,
    stop: StopSignal,
}

impl Beat {
    fn run(self) {
        let (lock, cvar) = &*self.stop;
        loop {
            {
                let mut stopped = lock.lock();
                if !*stopped {
                    cvar.wait_for(&mut stopped, self.interval);
                }
                if *stopped {
                    break;
                }
            }

            let seq = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
            let tick = Tick {
                seq,
                module: NAME.to_string(),
            };
            match serde_json::to_string(&tick) {
                Ok(payload) => self.bus.publish_async(TICK_TOPIC, payload),
                Err(e) => warn!(error = %e, "Failed to encode tick"),
            }

            if self.max_beats.is_some_and(|max| seq >= max) {
                info!(beats = seq, "Beat limit reached");
                if let Some(host) = &self.host {
                    host.request_shutdown();
                }
                break;
            }
        }
        debug!("Heartbeat worker exiting");
    }
}
