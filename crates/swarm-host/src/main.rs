//! # Swarm Host
//!
//! Registers the built-in modules, loads the enabled ones, starts them in
//! dependency order and keeps them running until Ctrl-C, SIGTERM or a
//! module-requested shutdown. Module statuses are logged every
//! `SWARM_STATUS_INTERVAL_SECS`.

use anyhow::{bail, Context, Result};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use swarm_host::builtin;
use swarm_host::lifecycle::error_chain;
use swarm_host::{HostConfig, LifecycleManager, ShutdownSignal};
use swarm_telemetry::{init_logging, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_logging(&telemetry).context("Failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting swarm host");

    // Step 1: Load and validate configuration
    let config = HostConfig::from_env();
    let catalog = builtin::catalog();
    if let Err(errors) = config.validate(&catalog) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        bail!("invalid host configuration ({} errors)", errors.len());
    }

    // Step 2: Register and load modules
    let mut manager = LifecycleManager::with_config(&config);
    builtin::register_all(&mut manager);

    for module in &catalog {
        if !config.is_enabled(module.name) {
            info!(module = module.name, "Module disabled by configuration");
            continue;
        }
        manager
            .load_module(module.name, config.module_config(module.name))
            .with_context(|| format!("Failed to load module `{}`", module.name))?;
    }

    // Step 3: Start everything in dependency order
    if let Err(errors) = manager.start_all_modules() {
        warn!(failed = errors.len(), "Some modules failed to start");
    }
    info!(running = ?manager.running_modules(), "Host is running. Press Ctrl+C to stop.");

    // Step 4: Wait for shutdown, logging statuses periodically
    let shutdown = manager.shutdown_signal();
    spawn_signal_listener(shutdown.clone());

    let mut ticker = interval(config.status_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (module, status) in manager.module_statuses() {
                    info!(module = %module, status = %status, "Module status");
                }
            }
            _ = shutdown.wait() => break,
        }
    }

    // Step 5: Tear down
    info!("Shutting down modules");
    if let Err(errors) = manager.shutdown_all_modules() {
        for e in &errors {
            warn!(error = %error_chain(e), "Shutdown problem");
        }
    }
    info!(
        messages = manager.bus().message_count(),
        "Swarm host stopped"
    );
    Ok(())
}

/// Trigger `signal` on Ctrl-C or SIGTERM.
fn spawn_signal_listener(signal: ShutdownSignal) {
    tokio::spawn(async move {
        let received = wait_for_os_signal().await;
        info!(signal = received, "Received shutdown signal");
        signal.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable; listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}
