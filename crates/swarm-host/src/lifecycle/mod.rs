//! # Lifecycle Manager - Plug-and-Play Module Host
//!
//! Owns every module record and the message bus. Modules are created from
//! registered factories, driven through their lifecycle in a fixed order and
//! communicate ONLY through the bus.
//!
//! ## State Machine
//!
//! ```text
//!                register_module
//!                       │
//!                       ▼
//!   ┌──────────┐  load_module   ┌────────┐  start_module  ┌─────────┐
//!   │Registered│ ─────────────→ │ Loaded │ ─────────────→ │ Running │
//!   │          │ ←───────────── │        │ ←───────────── │         │
//!   └──────────┘  unload_module └────────┘   stop_module  └─────────┘
//!        │
//!        ▼ unregister_module (from any state)
//! ```
//!
//! ## Guarantees
//!
//! - A failed operation leaves the record exactly as it was, except for
//!   [`LifecycleManager::force_stop_module`], which marks the module stopped
//!   by definition.
//! - `Running` implies an instance exists.
//! - A module starts only while every declared dependency is running.
//! - Module panics are caught and reported as [`LifecycleError::Panicked`].
//!
//! The manager is not internally synchronized: drive it from one control
//! thread. Modules may run their own threads once started.

mod error;
mod record;


pub use error::LifecycleError;
pub use record::{ModuleFactory, ModuleRecord, ModuleState};

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use swarm_bus::{describe_panic, MessageBus};
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::dependency::DependencyGraph;
use crate::module::{HostHandle, Module, ModuleConfig, ModuleContext, StateTable};
use crate::shutdown::ShutdownSignal;
use record::ModuleCell;

/// The central module registry and lifecycle driver.
pub struct LifecycleManager {
    modules: BTreeMap<String, ModuleRecord>,
    states: StateTable,
    bus: Arc<MessageBus>,
    shutdown: ShutdownSignal,
    /// Configs used when a module is loaded implicitly as a dependency.
    module_configs: BTreeMap<String, ModuleConfig>,
}

impl LifecycleManager {
    /// Create a manager with default configuration. The bus is started.
    pub fn new() -> Self {
        Self::with_config(&HostConfig::default())
    }

    /// Create a manager whose bus and implicit module configs come from
    /// `config`. The bus is started.
    pub fn with_config(config: &HostConfig) -> Self {
        let bus = Arc::new(MessageBus::with_config(config.bus.clone()));
        bus.start();

        info!(
            poll_interval = ?config.bus.poll_interval,
            "Lifecycle manager created"
        );

        Self {
            modules: BTreeMap::new(),
            states: StateTable::default(),
            bus,
            shutdown: ShutdownSignal::new(),
            module_configs: config.module_configs(),
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register (or replace) the factory for `name`.
    ///
    /// Replacing the factory of a loaded module keeps the current instance;
    /// the new factory is used on the next load.
    pub fn register_module<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Option<Box<dyn Module>> + Send + 'static,
    {
        let name = name.into();
        match self.modules.get_mut(&name) {
            Some(record) => {
                record.factory = Box::new(factory);
                info!(module = %name, state = %record.state, "Module factory replaced");
            }
            None => {
                self.modules
                    .insert(name.clone(), ModuleRecord::new(Box::new(factory)));
                self.states
                    .write()
                    .insert(name.clone(), ModuleState::Registered);
                info!(module = %name, "Module registered");
            }
        }
    }

    /// Remove `name` entirely, force-stopping and unloading it first.
    pub fn unregister_module(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = self.try_unregister(name);
        report("unregister", name, result)
    }

    fn try_unregister(&mut self, name: &str) -> Result<(), LifecycleError> {
        let state = self.record(name)?.state;
        if state == ModuleState::Running {
            self.stop_or_force(name);
        }
        if state.is_loaded() {
            self.try_unload(name)?;
        }
        self.modules.remove(name);
        self.states.write().remove(name);
        info!(module = %name, "Module unregistered");
        Ok(())
    }

    // =========================================================================
    // SINGLE-MODULE LIFECYCLE
    // =========================================================================

    /// Create, attach, configure and initialize the module.
    ///
    /// Nothing is recorded unless every step succeeds.
    pub fn load_module(&mut self, name: &str, config: ModuleConfig) -> Result<(), LifecycleError> {
        let result = self.try_load(name, config);
        report("load", name, result)
    }

    fn try_load(&mut self, name: &str, config: ModuleConfig) -> Result<(), LifecycleError> {
        let context = self.module_context();
        let record = self.record(name)?;
        if record.state != ModuleState::Registered {
            return Err(LifecycleError::AlreadyLoaded {
                module: name.to_string(),
            });
        }

        let module = match catch_unwind(AssertUnwindSafe(|| (record.factory)())) {
            Ok(Some(module)) => module,
            Ok(None) => {
                return Err(LifecycleError::FactoryFailed {
                    module: name.to_string(),
                    reason: "factory returned no instance".to_string(),
                })
            }
            Err(cause) => {
                return Err(LifecycleError::FactoryFailed {
                    module: name.to_string(),
                    reason: format!("factory panicked: {}", describe_panic(cause.as_ref())),
                })
            }
        };

        if module.name() != name {
            debug!(module = %name, reported = %module.name(), "Module reports a different name");
        }

        let cell = ModuleCell::new(name, module);
        cell.with_mut("attach", |m| m.attach(context))?;
        cell.with_mut("configure", |m| m.configure(&config))?
            .map_err(|source| LifecycleError::ConfigureFailed {
                module: name.to_string(),
                source,
            })?;
        cell.with_mut("initialize", |m| m.initialize())?
            .map_err(|source| LifecycleError::InitializeFailed {
                module: name.to_string(),
                source,
            })?;
        let (version, dependencies, topics) = cell.with_ref("describe", |m| {
            (m.version().to_string(), m.dependencies(), m.subscriptions())
        })?;

        let subscriptions = topics
            .iter()
            .map(|topic| self.bus.subscribe(topic, cell.forwarder()))
            .collect();

        let Some(record) = self.modules.get_mut(name) else {
            return Err(LifecycleError::NotRegistered {
                module: name.to_string(),
            });
        };
        record.instance = Some(cell);
        record.config = config;
        record.dependencies = dependencies;
        record.subscriptions = subscriptions;

        info!(
            module = %name,
            version = %version,
            dependencies = ?record.dependencies,
            topics = ?topics,
            "Module loaded"
        );
        self.set_state(name, ModuleState::Loaded);
        Ok(())
    }

    /// Start a loaded module. Succeeds without doing anything if it is
    /// already running.
    pub fn start_module(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = self.try_start(name);
        report("start", name, result)
    }

    fn try_start(&mut self, name: &str) -> Result<(), LifecycleError> {
        let record = self.record(name)?;
        match record.state {
            ModuleState::Registered => {
                return Err(LifecycleError::NotLoaded {
                    module: name.to_string(),
                })
            }
            ModuleState::Running => {
                debug!(module = %name, "Module already running");
                return Ok(());
            }
            ModuleState::Loaded => {}
        }
        self.check_dependencies(name, &record.dependencies)?;
        let cell = self.instance(name)?;

        cell.with_mut("start", |m| m.start())?
            .map_err(|source| LifecycleError::StartFailed {
                module: name.to_string(),
                source,
            })?;

        self.set_state(name, ModuleState::Running);
        info!(module = %name, "Module started");
        Ok(())
    }

    /// Stop a running module.
    ///
    /// If the module's `stop` fails or panics it is still considered
    /// running; use [`force_stop_module`](Self::force_stop_module) to
    /// override.
    pub fn stop_module(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = self.try_stop(name);
        report("stop", name, result)
    }

    fn try_stop(&mut self, name: &str) -> Result<(), LifecycleError> {
        if self.record(name)?.state != ModuleState::Running {
            return Err(LifecycleError::NotRunning {
                module: name.to_string(),
            });
        }

        let dependents = self.running_dependents(name);
        if !dependents.is_empty() {
            warn!(module = %name, dependents = ?dependents, "Stopping module with running dependents");
        }

        let cell = self.instance(name)?;
        cell.with_mut("stop", |m| m.stop())?
            .map_err(|source| LifecycleError::StopFailed {
                module: name.to_string(),
                source,
            })?;

        self.set_state(name, ModuleState::Loaded);
        info!(module = %name, "Module stopped");
        Ok(())
    }

    /// Stop a running module and mark it stopped even if its `stop` fails.
    pub fn force_stop_module(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = match self.record(name).map(|record| record.state) {
            Ok(ModuleState::Running) => {
                self.stop_or_force(name);
                Ok(())
            }
            Ok(_) => Err(LifecycleError::NotRunning {
                module: name.to_string(),
            }),
            Err(e) => Err(e),
        };
        report("force-stop", name, result)
    }

    /// Returns the stop failure, if any; the module is stopped either way.
    fn stop_or_force(&mut self, name: &str) -> Option<LifecycleError> {
        match self.try_stop(name) {
            Ok(()) => None,
            Err(e) => {
                warn!(module = %name, error = %error_chain(&e), "Stop failed; marking module stopped");
                self.set_state(name, ModuleState::Loaded);
                Some(e)
            }
        }
    }

    /// Stop (if running), unsubscribe, shut down and drop the instance.
    ///
    /// Fails with `StopFailed` and changes nothing if the stop fails.
    pub fn unload_module(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = self.try_unload(name);
        report("unload", name, result)
    }

    fn try_unload(&mut self, name: &str) -> Result<(), LifecycleError> {
        let state = self.record(name)?.state;
        match state {
            ModuleState::Registered => {
                return Err(LifecycleError::NotLoaded {
                    module: name.to_string(),
                })
            }
            ModuleState::Running => self.try_stop(name)?,
            ModuleState::Loaded => {}
        }

        let Some(record) = self.modules.get_mut(name) else {
            return Err(LifecycleError::NotRegistered {
                module: name.to_string(),
            });
        };
        let cell = record.instance.take();
        let subscriptions = mem::take(&mut record.subscriptions);
        record.dependencies.clear();
        record.config = ModuleConfig::default();

        for id in subscriptions {
            self.bus.unsubscribe(id);
        }
        if let Some(cell) = cell {
            if let Err(e) = cell.with_mut("shutdown", |m| m.shutdown()) {
                warn!(module = %name, error = %e, "Module shutdown failed");
            }
        }

        self.set_state(name, ModuleState::Registered);
        info!(module = %name, "Module unloaded");
        Ok(())
    }

    // =========================================================================
    // BATCH OPERATIONS
    // =========================================================================

    /// Start every loaded module, dependencies first.
    ///
    /// Modules on (or behind) a dependency cycle are skipped and reported as
    /// one `DependencyCycle`. Failures do not stop the remaining modules.
    pub fn start_all_modules(&mut self) -> Result<(), Vec<LifecycleError>> {
        let order = self.loaded_graph().partial_order();
        let mut errors = Vec::new();

        if !order.blocked.is_empty() {
            let err = LifecycleError::DependencyCycle {
                modules: order.cycle.clone(),
            };
            error!(skipped = ?order.blocked, error = %err, "Modules skipped");
            errors.push(err);
        }

        let mut started = 0usize;
        for name in &order.ordered {
            if self.module_state(name) != Some(ModuleState::Loaded) {
                continue;
            }
            match self.start_module(name) {
                Ok(()) => started += 1,
                Err(e) => errors.push(e),
            }
        }

        info!(started, failed = errors.len(), "Start-all complete");
        collect(errors)
    }

    /// Stop every running module, dependents first.
    pub fn stop_all_modules(&mut self) -> Result<(), Vec<LifecycleError>> {
        let mut errors = Vec::new();
        for name in self.teardown_order() {
            if !self.is_module_running(&name) {
                continue;
            }
            if let Err(e) = self.stop_module(&name) {
                errors.push(e);
            }
        }
        collect(errors)
    }

    /// Stop every running module (forcing those whose stop fails), then
    /// unload every loaded module. Calling it again is a no-op.
    pub fn shutdown_all_modules(&mut self) -> Result<(), Vec<LifecycleError>> {
        let order = self.teardown_order();
        if order.is_empty() {
            debug!("No loaded modules to shut down");
            return Ok(());
        }

        info!(modules = order.len(), "Shutting down all modules");
        let mut errors = Vec::new();

        for name in &order {
            if self.is_module_running(name) {
                errors.extend(self.stop_or_force(name));
            }
        }
        for name in &order {
            if self.module_state(name) == Some(ModuleState::Loaded) {
                if let Err(e) = self.unload_module(name) {
                    errors.push(e);
                }
            }
        }

        info!(failed = errors.len(), "All modules shut down");
        collect(errors)
    }

    // =========================================================================
    // DEPENDENCIES
    // =========================================================================

    /// `Ok` iff `name` is loaded and every declared dependency is running.
    pub fn resolve_dependencies(&self, name: &str) -> Result<(), LifecycleError> {
        let record = self.record(name)?;
        if !record.state.is_loaded() {
            return Err(LifecycleError::NotLoaded {
                module: name.to_string(),
            });
        }
        self.check_dependencies(name, &record.dependencies)
            .inspect_err(|e| warn!(module = %name, error = %e, "Unresolved dependency"))
    }

    /// Load every registered-but-unloaded transitive dependency of `name`,
    /// depth-first. Returns the newly loaded modules in load order.
    ///
    /// Implicitly loaded modules get their config from the [`HostConfig`]
    /// the manager was built with. On error, modules loaded before the
    /// failure stay loaded.
    pub fn load_module_dependencies(&mut self, name: &str) -> Result<Vec<String>, LifecycleError> {
        let result = self.try_load_dependencies(name);
        report("load dependencies of", name, result)
    }

    fn try_load_dependencies(&mut self, name: &str) -> Result<Vec<String>, LifecycleError> {
        if !self.record(name)?.state.is_loaded() {
            return Err(LifecycleError::NotLoaded {
                module: name.to_string(),
            });
        }

        let mut loaded = Vec::new();
        let mut path = vec![name.to_string()];
        let mut visited = BTreeSet::new();
        self.load_dependencies_of(name, &mut path, &mut visited, &mut loaded)?;
        Ok(loaded)
    }

    fn load_dependencies_of(
        &mut self,
        name: &str,
        path: &mut Vec<String>,
        visited: &mut BTreeSet<String>,
        loaded: &mut Vec<String>,
    ) -> Result<(), LifecycleError> {
        let dependencies = self
            .modules
            .get(name)
            .map(|record| record.dependencies.clone())
            .unwrap_or_default();

        for dependency in dependencies {
            if let Some(pos) = path.iter().position(|p| *p == dependency) {
                let mut modules = path[pos..].to_vec();
                modules.push(dependency);
                return Err(LifecycleError::DependencyCycle { modules });
            }
            if visited.contains(&dependency) {
                continue;
            }

            match self.module_state(&dependency) {
                None => {
                    return Err(LifecycleError::MissingDependency {
                        module: name.to_string(),
                        dependency,
                    })
                }
                Some(ModuleState::Registered) => {
                    let config = self
                        .module_configs
                        .get(&dependency)
                        .cloned()
                        .unwrap_or_default();
                    self.try_load(&dependency, config)?;
                    loaded.push(dependency.clone());
                }
                Some(_) => {}
            }

            path.push(dependency.clone());
            self.load_dependencies_of(&dependency, path, visited, loaded)?;
            path.pop();
            visited.insert(dependency);
        }
        Ok(())
    }

    /// Start the loaded transitive dependencies of `name` in dependency
    /// order, then `name`. Stops at the first failure.
    pub fn start_module_with_dependencies(&mut self, name: &str) -> Result<(), LifecycleError> {
        let result = self.try_start_with_dependencies(name);
        report("start (with dependencies)", name, result)
    }

    fn try_start_with_dependencies(&mut self, name: &str) -> Result<(), LifecycleError> {
        if !self.record(name)?.state.is_loaded() {
            return Err(LifecycleError::NotLoaded {
                module: name.to_string(),
            });
        }
        let order = self.loaded_graph().dependency_order(name)?;
        for module in &order {
            self.try_start(module)?;
        }
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// `None` if the module is not registered.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.modules.get(name).map(|record| record.state)
    }

    pub fn is_module_registered(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.module_state(name).is_some_and(ModuleState::is_loaded)
    }

    pub fn is_module_running(&self, name: &str) -> bool {
        self.module_state(name) == Some(ModuleState::Running)
    }

    /// All registered modules, sorted.
    pub fn registered_modules(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Loaded or running modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.names_where(ModuleState::is_loaded)
    }

    /// Running modules, sorted.
    pub fn running_modules(&self) -> Vec<String> {
        self.names_where(|state| state == ModuleState::Running)
    }

    /// Declared dependencies of a loaded module; empty otherwise.
    pub fn module_dependencies(&self, name: &str) -> Vec<String> {
        self.modules
            .get(name)
            .map(|record| record.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn module_record(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    /// `status()` of every loaded module.
    pub fn module_statuses(&self) -> BTreeMap<String, String> {
        self.modules
            .iter()
            .filter_map(|(name, record)| {
                let cell = record.instance.as_ref()?;
                let status = cell
                    .with_ref("status", |m| m.status())
                    .unwrap_or_else(|e| format!("<status unavailable: {e}>"));
                Some((name.clone(), status))
            })
            .collect()
    }

    /// Run `f` against a loaded module. `None` if it is not loaded, is busy
    /// on this thread, or `f` panics.
    pub fn with_module<R>(&self, name: &str, f: impl FnOnce(&dyn Module) -> R) -> Option<R> {
        let cell = self.modules.get(name)?.instance.as_ref()?;
        cell.with_ref("inspect", f)
            .inspect_err(|e| warn!(module = %name, error = %e, "Module inspection failed"))
            .ok()
    }

    /// Run `f` against a loaded module of concrete type `T`. `None` if it is
    /// not loaded, is not a `T`, is busy, or `f` panics.
    pub fn with_module_as<T, R>(&self, name: &str, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: Module,
    {
        let cell = self.modules.get(name)?.instance.as_ref()?;
        cell.with_mut("inspect", |m| m.as_any_mut().downcast_mut::<T>().map(f))
            .inspect_err(|e| warn!(module = %name, error = %e, "Module inspection failed"))
            .ok()
            .flatten()
    }

    /// The bus shared with every module.
    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    /// Non-owning handle to this manager, as given to modules.
    pub fn host_handle(&self) -> HostHandle {
        HostHandle::new(Arc::clone(&self.states), self.shutdown.clone())
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn record(&self, name: &str) -> Result<&ModuleRecord, LifecycleError> {
        self.modules
            .get(name)
            .ok_or_else(|| LifecycleError::NotRegistered {
                module: name.to_string(),
            })
    }

    fn instance(&self, name: &str) -> Result<ModuleCell, LifecycleError> {
        self.record(name)?
            .instance
            .clone()
            .ok_or_else(|| LifecycleError::NotLoaded {
                module: name.to_string(),
            })
    }

    fn set_state(&mut self, name: &str, state: ModuleState) {
        if let Some(record) = self.modules.get_mut(name) {
            record.state = state;
            self.states.write().insert(name.to_string(), state);
        }
    }

    fn module_context(&self) -> ModuleContext {
        ModuleContext {
            bus: Arc::clone(&self.bus),
            host: self.host_handle(),
        }
    }

    fn check_dependencies(&self, name: &str, dependencies: &[String]) -> Result<(), LifecycleError> {
        match dependencies.iter().find(|dep| !self.is_module_running(dep)) {
            Some(dependency) => Err(LifecycleError::DependencyNotRunning {
                module: name.to_string(),
                dependency: dependency.clone(),
            }),
            None => Ok(()),
        }
    }

    fn running_dependents(&self, name: &str) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, record)| {
                record.state == ModuleState::Running
                    && record.dependencies.iter().any(|dep| dep == name)
            })
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    fn names_where(&self, predicate: impl Fn(ModuleState) -> bool) -> Vec<String> {
        self.modules
            .iter()
            .filter(|(_, record)| predicate(record.state))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Graph over loaded modules only.
    fn loaded_graph(&self) -> DependencyGraph {
        DependencyGraph::from_modules(
            self.modules
                .iter()
                .filter(|(_, record)| record.state.is_loaded())
                .map(|(name, record)| (name.as_str(), record.dependencies.iter().map(String::as_str))),
        )
    }

    /// Loaded modules, dependents before their dependencies.
    fn teardown_order(&self) -> Vec<String> {
        let order = self.loaded_graph().partial_order();
        order
            .blocked
            .into_iter()
            .rev()
            .chain(order.ordered.into_iter().rev())
            .collect()
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        // Failures are already logged per module
        let _ = self.shutdown_all_modules();
        self.bus.stop();
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("modules", &self.modules)
            .field("bus_running", &self.bus.is_running())
            .finish_non_exhaustive()
    }
}

/// Log a failed operation at the manager boundary and pass the result on.
fn report<T>(action: &str, name: &str, result: Result<T, LifecycleError>) -> Result<T, LifecycleError> {
    if let Err(e) = &result {
        error!(module = %name, error = %error_chain(e), "Failed to {action} module");
    }
    result
}

fn collect(errors: Vec<LifecycleError>) -> Result<(), Vec<LifecycleError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `err` followed by its sources, separated by `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
