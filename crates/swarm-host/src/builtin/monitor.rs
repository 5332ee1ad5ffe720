//! Bus monitor: counts heartbeat ticks and periodically publishes a summary.
//!
//! Depends on `heartbeat`. Config: `report_every` (default 10, must be > 0).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swarm_bus::MessageBus;
use swarm_telemetry::log_event;
use tracing::{debug, warn};

use super::heartbeat::{self, Tick};
use crate::module::{Module, ModuleConfig, ModuleContext, ModuleError};

pub const NAME: &str = "bus-monitor";

/// Topic summaries are published on.
pub const REPORT_TOPIC: &str = "monitor.report";

pub const DEPENDENCIES: &[&str] = &[heartbeat::NAME];

pub const DEFAULT_REPORT_EVERY: u64 = 10;

/// Payload of a [`REPORT_TOPIC`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub ticks: u64,
    pub last_seq: u64,
    pub malformed: u64,
}

#[derive(Debug)]
pub struct BusMonitorModule {
    bus: Option<Arc<MessageBus>>,
    report_every: u64,
    running: bool,
    ticks: u64,
    last_seq: u64,
    malformed: u64,
    reports: u64,
}

impl BusMonitorModule {
    pub fn new() -> Self {
        Self {
            bus: None,
            report_every: DEFAULT_REPORT_EVERY,
            running: false,
            ticks: 0,
            last_seq: 0,
            malformed: 0,
            reports: 0,
        }
    }

    /// Ticks counted while running.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick payloads that failed to decode.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Reports published so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    fn publish_report(&mut self) {
        let Some(bus) = &self.bus else {
            return;
        };
        let report = Report {
            ticks: self.ticks,
            last_seq: self.last_seq,
            malformed: self.malformed,
        };
        match serde_json::to_string(&report) {
            Ok(payload) => {
                bus.publish_async(REPORT_TOPIC, payload);
                self.reports += 1;
                debug!(ticks = self.ticks, "Monitor report published");
            }
            Err(e) => warn!(error = %e, "Failed to encode monitor report"),
        }
    }
}

impl Default for BusMonitorModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for BusMonitorModule {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn dependencies(&self) -> Vec<String> {
        DEPENDENCIES.iter().map(|d| (*d).to_string()).collect()
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![heartbeat::TICK_TOPIC.to_string()]
    }

    fn attach(&mut self, ctx: ModuleContext) {
        self.bus = Some(ctx.bus);
    }

    fn configure(&mut self, config: &ModuleConfig) -> Result<(), ModuleError> {
        let report_every = config.parse_or("report_every", DEFAULT_REPORT_EVERY)?;
        if report_every == 0 {
            return Err(ModuleError::InvalidConfig {
                key: "report_every".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.report_every = report_every;
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), ModuleError> {
        if self.bus.is_none() {
            return Err(ModuleError::Initialization(
                "message bus not attached".to_string(),
            ));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), ModuleError> {
        self.running = true;
        log_event!(info, NAME, "Bus monitor started", report_every = self.report_every);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        if self.running {
            self.running = false;
            log_event!(info, NAME, "Bus monitor stopped", ticks = self.ticks);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn status(&self) -> String {
        format!(
            "Bus monitor (running: {}, ticks: {}, malformed: {}, reports: {})",
            if self.running { "yes" } else { "no" },
            self.ticks,
            self.malformed,
            self.reports
        )
    }

    fn on_message(&mut self, topic: &str, payload: &str) {
        if topic != heartbeat::TICK_TOPIC {
            return;
        }
        if !self.running {
            debug!(topic, "Tick received while stopped; ignored");
            return;
        }

        match serde_json::from_str::<Tick>(payload) {
            Ok(tick) => {
                self.ticks += 1;
                self.last_seq = tick.seq;
            }
            Err(e) => {
                self.malformed += 1;
                warn!(topic, error = %e, "Malformed tick payload");
                return;
            }
        }

        if self.ticks % self.report_every == 0 {
            self.publish_report();
        }
    }
}
