//! Module records and guarded access to module instances.

use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use swarm_bus::{describe_panic, SubscriptionId};
use tracing::warn;

use super::LifecycleError;
use crate::module::{Module, ModuleConfig};

/// Zero-argument constructor registered for a module name. Returning `None`
/// means the module could not be created.
pub type ModuleFactory = Box<dyn Fn() -> Option<Box<dyn Module>> + Send>;

/// Where a registered module is in its lifecycle.
///
/// A module that is not registered has no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleState {
    /// Factory known, no instance.
    Registered,
    /// Instance created, configured and initialized.
    Loaded,
    /// Instance started.
    Running,
}

impl ModuleState {
    /// `true` for `Loaded` and `Running`.
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded | Self::Running)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::Loaded => "loaded",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

/// Instance shared between the control thread and bus handlers.
///
/// The re-entrant lock serializes threads; the `RefCell` catches a module
/// being re-entered on the thread that already holds it.
#[derive(Clone)]
pub(crate) struct ModuleCell {
    name: Arc<str>,
    inner: Arc<ReentrantMutex<RefCell<Box<dyn Module>>>>,
}

impl ModuleCell {
    pub(crate) fn new(name: &str, module: Box<dyn Module>) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(ReentrantMutex::new(RefCell::new(module))),
        }
    }

    /// Run `f` with exclusive access to the instance. Panics inside `f` are
    /// caught and reported as [`LifecycleError::Panicked`].
    pub(crate) fn with_mut<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn Module) -> R,
    ) -> Result<R, LifecycleError> {
        let guard = self.inner.lock();
        let mut module = guard
            .try_borrow_mut()
            .map_err(|_| LifecycleError::ModuleBusy {
                module: self.name.to_string(),
                operation,
            })?;
        let outcome = catch_unwind(AssertUnwindSafe(|| f(&mut **module)));
        outcome.map_err(|cause| LifecycleError::Panicked {
            module: self.name.to_string(),
            operation,
            message: describe_panic(cause.as_ref()),
        })
    }

    /// Shared-access counterpart of [`with_mut`](Self::with_mut).
    pub(crate) fn with_ref<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Module) -> R,
    ) -> Result<R, LifecycleError> {
        let guard = self.inner.lock();
        let module = guard.try_borrow().map_err(|_| LifecycleError::ModuleBusy {
            module: self.name.to_string(),
            operation,
        })?;
        let outcome = catch_unwind(AssertUnwindSafe(|| f(&**module)));
        outcome.map_err(|cause| LifecycleError::Panicked {
            module: self.name.to_string(),
            operation,
            message: describe_panic(cause.as_ref()),
        })
    }

    /// Bus handler routing messages to `on_message`.
    ///
    /// Holds the instance weakly, so a subscription that outlives the
    /// instance delivers nothing. A message arriving while the module is
    /// already executing on the same thread is dropped.
    pub(crate) fn forwarder(&self) -> impl Fn(&str, &str) + Send + Sync + 'static {
        let name = Arc::clone(&self.name);
        let weak: Weak<ReentrantMutex<RefCell<Box<dyn Module>>>> = Arc::downgrade(&self.inner);
        move |topic: &str, payload: &str| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let guard = inner.lock();
            let Ok(mut module) = guard.try_borrow_mut() else {
                warn!(
                    module = %name,
                    topic = %topic,
                    "Module is busy on this thread; message dropped"
                );
                return;
            };
            module.on_message(topic, payload);
        }
    }
}

/// Everything the manager knows about one registered module.
pub struct ModuleRecord {
    pub(crate) factory: ModuleFactory,
    pub(crate) instance: Option<ModuleCell>,
    pub(crate) state: ModuleState,
    pub(crate) config: ModuleConfig,
    pub(crate) dependencies: Vec<String>,
    pub(crate) subscriptions: Vec<SubscriptionId>,
}

impl ModuleRecord {
    pub(crate) fn new(factory: ModuleFactory) -> Self {
        Self {
            factory,
            instance: None,
            state: ModuleState::Registered,
            config: ModuleConfig::default(),
            dependencies: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Configuration the instance was loaded with.
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Dependencies declared by the loaded instance.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("dependencies", &self.dependencies)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
