//! # Swarm Host Library
//!
//! Module lifecycle host with an embedded message bus. The `swarm-host`
//! binary in `main.rs` is a thin shell around this library.
//!
//! ## Modular Structure
//!
//! - `module/` - The [`Module`] contract, its config and context handles
//! - `lifecycle/` - [`LifecycleManager`]: records, state machine, batch ops
//! - `dependency` - Dependency graph with deterministic topological order
//! - `config` - [`HostConfig`] loaded from the environment
//! - `shutdown` - [`ShutdownSignal`] shared by `main` and modules
//! - `builtin/` - Demo modules shipped with the host
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (from env)
//! 2. Validate enabled modules against the built-in catalog
//! 3. Register factories, load enabled modules with their configs
//! 4. Start all modules in dependency order
//! 5. Wait for Ctrl-C, SIGTERM or a module-requested shutdown
//! 6. Stop and unload everything in reverse dependency order

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod builtin;
pub mod config;
pub mod dependency;
pub mod lifecycle;
pub mod module;
pub mod shutdown;

// Re-export the main types for easy access
pub use config::{ConfigError, HostConfig, ModuleSettings};
pub use dependency::{DependencyError, DependencyGraph};
pub use lifecycle::{LifecycleError, LifecycleManager, ModuleFactory, ModuleState};
pub use module::{HostHandle, Module, ModuleConfig, ModuleContext, ModuleError};
pub use shutdown::ShutdownSignal;
pub use swarm_bus::{MessageBus, SubscriptionId};
