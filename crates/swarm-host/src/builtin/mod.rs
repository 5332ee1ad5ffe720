//! # Built-in Modules
//!
//! Small modules shipped with the host. They do no I/O; they exist to
//! exercise worker threads, dependencies and bus routing end to end.
//!
//! ```text
//! ┌───────────┐  heartbeat.tick   ┌─────────────┐  monitor.report
//! │ heartbeat │ ────────────────→ │ bus-monitor │ ───────────────→
//! └───────────┘   (async, JSON)   └─────────────┘  every N ticks
//! ```

pub mod heartbeat;
pub mod monitor;

pub use heartbeat::HeartbeatModule;
pub use monitor::BusMonitorModule;

use crate::lifecycle::LifecycleManager;
use crate::module::Module;

/// Static description of a built-in module.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinModule {
    pub name: &'static str,
    pub dependencies: &'static [&'static str],
    pub create: fn() -> Box<dyn Module>,
}

impl BuiltinModule {
    /// Factory suitable for [`LifecycleManager::register_module`].
    pub fn factory(&self) -> impl Fn() -> Option<Box<dyn Module>> + Send + 'static {
        let create = self.create;
        move || Some(create())
    }
}

/// Every built-in module, dependencies first.
pub fn catalog() -> Vec<BuiltinModule> {
    vec![
        BuiltinModule {
            name: heartbeat::NAME,
            dependencies: &[],
            create: || Box::new(HeartbeatModule::new()),
        },
        BuiltinModule {
            name: monitor::NAME,
            dependencies: monitor::DEPENDENCIES,
            create: || Box::new(BusMonitorModule::new()),
        },
    ]
}

/// Register every built-in module with `manager`.
pub fn register_all(manager: &mut LifecycleManager) {
    for module in catalog() {
        manager.register_module(module.name, module.factory());
    }
}
