//! Lifecycle manager errors.

use thiserror::Error;

use crate::dependency::DependencyError;
use crate::module::ModuleError;

/// Every way a lifecycle operation can fail.
///
/// Module-side failures carry the module's own [`ModuleError`] as `source`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("module `{module}` is not registered")]
    NotRegistered { module: String },

    #[error("module `{module}` is already loaded")]
    AlreadyLoaded { module: String },

    #[error("module `{module}` is not loaded")]
    NotLoaded { module: String },

    #[error("module `{module}` is not running")]
    NotRunning { module: String },

    #[error("factory for module `{module}` failed: {reason}")]
    FactoryFailed { module: String, reason: String },

    #[error("failed to configure module `{module}`")]
    ConfigureFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("failed to initialize module `{module}`")]
    InitializeFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("failed to start module `{module}`")]
    StartFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    /// The module is still considered running.
    #[error("failed to stop module `{module}`")]
    StopFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("module `{module}` panicked in {operation}: {message}")]
    Panicked {
        module: String,
        operation: &'static str,
        message: String,
    },

    /// The instance is already executing on this thread.
    #[error("module `{module}` is busy and cannot run {operation}")]
    ModuleBusy {
        module: String,
        operation: &'static str,
    },

    #[error("module `{module}` requires `{dependency}`, which is not running")]
    DependencyNotRunning { module: String, dependency: String },

    #[error("module `{module}` requires `{dependency}`, which is not registered")]
    MissingDependency { module: String, dependency: String },

    #[error("dependency cycle: {}", .modules.join(" -> "))]
    DependencyCycle { modules: Vec<String> },
}

impl LifecycleError {
    /// Name of the module the error is about, when there is exactly one.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::NotRegistered { module }
            | Self::AlreadyLoaded { module }
            | Self::NotLoaded { module }
            | Self::NotRunning { module }
            | Self::FactoryFailed { module, .. }
            | Self::ConfigureFailed { module, .. }
            | Self::InitializeFailed { module, .. }
            | Self::StartFailed { module, .. }
            | Self::StopFailed { module, .. }
            | Self::Panicked { module, .. }
            | Self::ModuleBusy { module, .. }
            | Self::DependencyNotRunning { module, .. }
            | Self::MissingDependency { module, .. } => Some(module),
            Self::DependencyCycle { .. } => None,
        }
    }
}

impl From<DependencyError> for LifecycleError {
    fn from(err: DependencyError) -> Self {
        match err {
            DependencyError::Cycle(modules) => Self::DependencyCycle { modules },
            DependencyError::UnknownModule(module) => Self::NotLoaded { module },
        }
    }
}
