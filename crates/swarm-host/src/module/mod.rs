//! # Module Contract
//!
//! Every pluggable unit the host runs implements [`Module`]. The host drives
//! each instance through the same sequence:
//!
//! ```text
//! attach → configure → initialize → start ⇄ stop → shutdown
//! ```
//!
//! `attach` hands the module its [`ModuleContext`]: a handle to the message
//! bus and a non-owning [`HostHandle`] back to the host. Modules talk to each
//! other ONLY through the bus.
//!
//! ## Threading
//!
//! Lifecycle calls arrive on the host's control thread. `on_message` arrives
//! on whichever thread published (the bus dispatch thread for
//! `publish_async`). The host serializes the two per instance, so a module
//! never sees overlapping calls. A consequence: `stop` must not wait on a
//! thread that synchronously publishes to a topic this module subscribes to.

mod config;
mod context;

pub use config::ModuleConfig;
pub use context::{HostHandle, ModuleContext};
pub(crate) use context::StateTable;

use std::any::Any;

use thiserror::Error;

/// Errors reported by a module from its own lifecycle methods.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleError {
    /// A configuration value could not be used.
    #[error("invalid value {value:?} for `{key}`: {reason}")]
    InvalidConfig {
        key: String,
        value: String,
        reason: String,
    },

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("start failed: {0}")]
    Start(String),

    #[error("stop failed: {0}")]
    Stop(String),
}

/// Upcast support so the host can hand out typed access to a module.
///
/// Blanket-implemented for every `'static` type; module authors never
/// implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Trait that all modules must implement to be hosted.
pub trait Module: AsAny + Send {
    /// Module name, normally the name it is registered under.
    fn name(&self) -> &str;

    /// Module version string.
    fn version(&self) -> &str;

    /// Names of modules that must be running before this one starts.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Topics whose messages the host routes to [`Module::on_message`].
    fn subscriptions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receive the bus and host handles. Called once, before `configure`.
    fn attach(&mut self, _ctx: ModuleContext) {}

    /// Apply configuration. Called once per load, before `initialize`.
    fn configure(&mut self, _config: &ModuleConfig) -> Result<(), ModuleError> {
        Ok(())
    }

    /// One-time setup. Must not spawn threads.
    fn initialize(&mut self) -> Result<(), ModuleError>;

    /// Begin work. May spawn threads.
    fn start(&mut self) -> Result<(), ModuleError>;

    /// End work. Must be safe to call repeatedly and without a prior `start`.
    fn stop(&mut self) -> Result<(), ModuleError>;

    /// Final teardown before the instance is dropped. Tolerates repeats.
    fn shutdown(&mut self) {
        let _ = self.stop();
    }

    fn is_running(&self) -> bool;

    /// Human-readable one-line status.
    fn status(&self) -> String;

    /// Deliver a bus message on one of [`Module::subscriptions`].
    fn on_message(&mut self, _topic: &str, _payload: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal {
        running: bool,
        stops: u32,
    }

    impl Module for Minimal {
        fn name(&self) -> &str {
            "minimal"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn initialize(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }

        fn start(&mut self) -> Result<(), ModuleError> {
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), ModuleError> {
            self.running = false;
            self.stops += 1;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn status(&self) -> String {
            format!("minimal (running: {})", self.running)
        }
    }

    #[test]
    fn test_default_methods() {
        let mut module = Minimal {
            running: false,
            stops: 0,
        };
        assert!(module.dependencies().is_empty());
        assert!(module.subscriptions().is_empty());
        assert!(module.configure(&ModuleConfig::new()).is_ok());

        module.start().unwrap();
        assert!(module.is_running());

        // Default shutdown stops the module
        module.shutdown();
        assert!(!module.is_running());
        assert_eq!(module.stops, 1);
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let mut boxed: Box<dyn Module> = Box::new(Minimal {
            running: false,
            stops: 0,
        });
        let module: &mut dyn Module = boxed.as_mut();
        module.as_any_mut().downcast_mut::<Minimal>().unwrap().stops = 5;

        let module: &dyn Module = boxed.as_ref();
        assert_eq!(module.as_any().downcast_ref::<Minimal>().unwrap().stops, 5);
    }

    #[test]
    fn test_error_display() {
        let err = ModuleError::InvalidConfig {
            key: "interval_ms".to_string(),
            value: "abc".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value \"abc\" for `interval_ms`: not a number"
        );
        assert_eq!(
            ModuleError::Start("port busy".to_string()).to_string(),
            "start failed: port busy"
        );
    }
}
