//! Handles injected into every module at load time.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use swarm_bus::MessageBus;

use crate::lifecycle::ModuleState;
use crate::shutdown::ShutdownSignal;

/// Module states as seen by modules; kept in sync by the lifecycle manager.
pub(crate) type StateTable = Arc<RwLock<BTreeMap<String, ModuleState>>>;

/// Everything a module receives in [`Module::attach`](super::Module::attach).
#[derive(Clone)]
pub struct ModuleContext {
    /// Shared message bus. Modules never start or stop it.
    pub bus: Arc<MessageBus>,
    /// Back-reference to the host.
    pub host: HostHandle,
}

/// Non-owning, read-mostly view of the host.
///
/// Holding a `HostHandle` never keeps modules alive and grants no lifecycle
/// control beyond requesting a host shutdown.
#[derive(Clone)]
pub struct HostHandle {
    states: StateTable,
    shutdown: ShutdownSignal,
}

impl HostHandle {
    pub(crate) fn new(states: StateTable, shutdown: ShutdownSignal) -> Self {
        Self { states, shutdown }
    }

    /// State of a registered module, or `None` if it is not registered.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.states.read().get(name).copied()
    }

    pub fn is_module_running(&self, name: &str) -> bool {
        self.module_state(name) == Some(ModuleState::Running)
    }

    /// Names of running modules, sorted.
    pub fn running_modules(&self) -> Vec<String> {
        self.states
            .read()
            .iter()
            .filter(|(_, state)| **state == ModuleState::Running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Ask the host process to shut down.
    pub fn request_shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_triggered()
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("modules", &self.states.read().len())
            .field("shutdown_requested", &self.shutdown_requested())
            .finish()
    }
}
