//! # Host Configuration
//!
//! Runtime parameters for the host binary and the modules it loads.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SWARM_BUS_POLL_MS` | `100` | Dispatch loop wake-up bound |
//! | `SWARM_STATUS_INTERVAL_SECS` | `10` | Module status log interval |
//! | `SWARM_MODULE_<NAME>` | built-ins on | Enable/disable a module |
//! | `SWARM_MODULE_<NAME>__<KEY>` | - | Module config entry |
//!
//! `<NAME>` is upper-case with `_` for `-` (`BUS_MONITOR` → `bus-monitor`);
//! `<KEY>` is lower-cased (`INTERVAL_MS` → `interval_ms`).

use std::collections::BTreeMap;
use std::time::Duration;

use swarm_bus::BusConfig;
use swarm_telemetry::parse_flag;
use thiserror::Error;
use tracing::warn;

use crate::builtin::{self, BuiltinModule};
use crate::module::ModuleConfig;

/// Default interval between module status log lines.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 10;

const MODULE_PREFIX: &str = "SWARM_MODULE_";
const MODULE_KEY_SEPARATOR: &str = "__";

/// Whether a module is loaded at startup, and with what config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSettings {
    pub enabled: bool,
    pub config: ModuleConfig,
}

/// Complete host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Message bus tunables.
    pub bus: BusConfig,
    /// How often the binary logs module statuses.
    pub status_interval: Duration,
    /// Per-module settings, keyed by module name.
    pub modules: BTreeMap<String, ModuleSettings>,
}

impl Default for HostConfig {
    fn default() -> Self {
        // Built-in modules are enabled by default
        let modules = builtin::catalog()
            .iter()
            .map(|module| {
                (
                    module.name.to_string(),
                    ModuleSettings {
                        enabled: true,
                        config: ModuleConfig::default(),
                    },
                )
            })
            .collect();

        Self {
            bus: BusConfig::default(),
            status_interval: Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS),
            modules,
        }
    }
}

impl HostConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load from `(name, value)` pairs, starting from the defaults.
    /// Unparseable values are logged and ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "SWARM_BUS_POLL_MS" => match value.trim().parse::<u64>() {
                    Ok(ms) => config.bus = BusConfig::with_poll_interval(Duration::from_millis(ms)),
                    Err(e) => warn!(key, value, error = %e, "Ignoring invalid bus poll interval"),
                },
                "SWARM_STATUS_INTERVAL_SECS" => match value.trim().parse::<u64>() {
                    Ok(secs) => config.status_interval = Duration::from_secs(secs),
                    Err(e) => warn!(key, value, error = %e, "Ignoring invalid status interval"),
                },
                _ => {
                    if let Some(rest) = key.strip_prefix(MODULE_PREFIX) {
                        config.apply_module_var(rest, value);
                    }
                }
            }
        }

        config
    }

    fn apply_module_var(&mut self, rest: &str, value: &str) {
        match rest.split_once(MODULE_KEY_SEPARATOR) {
            Some((module, setting)) if !module.is_empty() && !setting.is_empty() => {
                self.modules
                    .entry(module_name(module))
                    .or_default()
                    .config
                    .insert(setting.to_ascii_lowercase(), value);
            }
            Some(_) => warn!(suffix = rest, "Ignoring malformed module variable"),
            None if rest.is_empty() => {}
            None => {
                let settings = self.modules.entry(module_name(rest)).or_default();
                settings.enabled = parse_flag(value, settings.enabled);
            }
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.modules.get(name).is_some_and(|s| s.enabled)
    }

    pub fn enable(&mut self, name: &str) {
        self.modules.entry(name.to_string()).or_default().enabled = true;
    }

    pub fn disable(&mut self, name: &str) {
        self.modules.entry(name.to_string()).or_default().enabled = false;
    }

    /// Enabled module names, sorted.
    pub fn enabled_modules(&self) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Config for `name`; empty if none was given.
    pub fn module_config(&self, name: &str) -> ModuleConfig {
        self.modules
            .get(name)
            .map(|settings| settings.config.clone())
            .unwrap_or_default()
    }

    /// Config of every configured module, enabled or not.
    pub fn module_configs(&self) -> BTreeMap<String, ModuleConfig> {
        self.modules
            .iter()
            .map(|(name, settings)| (name.clone(), settings.config.clone()))
            .collect()
    }

    /// Check intervals and that every enabled module is known and has its
    /// dependencies enabled.
    pub fn validate(&self, catalog: &[BuiltinModule]) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.bus.poll_interval.is_zero() {
            errors.push(ConfigError::ZeroPollInterval);
        }
        if self.status_interval.is_zero() {
            errors.push(ConfigError::ZeroStatusInterval);
        }

        for name in self.enabled_modules() {
            let Some(module) = catalog.iter().find(|m| m.name == name) else {
                errors.push(ConfigError::UnknownModule(name));
                continue;
            };
            for dep in module.dependencies {
                if !self.is_enabled(dep) {
                    errors.push(ConfigError::DisabledDependency {
                        module: name.clone(),
                        dependency: (*dep).to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `BUS_MONITOR` → `bus-monitor`.
fn module_name(raw: &str) -> String {
    raw.to_ascii_lowercase().replace('_', "-")
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bus poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("status interval must be greater than zero")]
    ZeroStatusInterval,

    #[error("module `{0}` is enabled but unknown")]
    UnknownModule(String),

    #[error("module `{module}` requires `{dependency}` but it is disabled")]
    DisabledDependency { module: String, dependency: String },
}
