//! # Lifecycle Flows
//!
//! Modules driven by `swarm-host` that only talk through `swarm-bus`:
//!
//! 1. **Ordering**: start requires load, stop requires start
//! 2. **Dependencies**: a module starts only after its dependencies run
//! 3. **Shutdown**: `shutdown_all_modules` is repeatable
//! 4. **Choreography**: request/response between modules over topics

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use swarm_bus::MessageBus;
    use swarm_host::{
        LifecycleError, LifecycleManager, Module, ModuleConfig, ModuleContext, ModuleError,
        ModuleState,
    };

    use crate::integration::{wait_for, DELIVERY_TIMEOUT};

    const PING: &str = "echo.ping";
    const PONG: &str = "echo.pong";

    // =============================================================================
    // TEST MODULES
    // =============================================================================

    /// Answers every `echo.ping` with an `echo.pong` carrying the same payload.
    #[derive(Default)]
    struct EchoModule {
        bus: Option<Arc<MessageBus>>,
        running: bool,
        answered: u64,
    }

    impl Module for EchoModule {
        fn name(&self) -> &str {
            "echo"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn subscriptions(&self) -> Vec<String> {
            vec![PING.to_string()]
        }

        fn attach(&mut self, ctx: ModuleContext) {
            self.bus = Some(ctx.bus);
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
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn status(&self) -> String {
            format!("echo answered {}", self.answered)
        }

        fn on_message(&mut self, _topic: &str, payload: &str) {
            if !self.running {
                return;
            }
            if let Some(bus) = &self.bus {
                self.answered += 1;
                bus.publish_async(PONG, payload);
            }
        }
    }

    /// Counts `echo.pong` messages into a shared counter. Depends on `echo`.
    struct CollectorModule {
        pongs: Arc<AtomicU64>,
        running: bool,
    }

    impl Module for CollectorModule {
        fn name(&self) -> &str {
            "collector"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn dependencies(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        fn subscriptions(&self) -> Vec<String> {
            vec![PONG.to_string()]
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
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn status(&self) -> String {
            format!("collector saw {}", self.pongs.load(Ordering::SeqCst))
        }

        fn on_message(&mut self, _topic: &str, _payload: &str) {
            if self.running {
                self.pongs.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn manager_with_modules() -> (LifecycleManager, Arc<AtomicU64>) {
        swarm_telemetry::init_test_logging();
        let mut manager = LifecycleManager::new();
        let pongs = Arc::new(AtomicU64::new(0));

        manager.register_module("echo", || Some(Box::new(EchoModule::default()) as Box<dyn Module>));
        {
            let pongs = Arc::clone(&pongs);
            manager.register_module("collector", move || {
                Some(Box::new(CollectorModule {
                    pongs: Arc::clone(&pongs),
                    running: false,
                }) as Box<dyn Module>)
            });
        }
        (manager, pongs)
    }

    // =============================================================================
    // ORDERING
    // =============================================================================

    #[test]
    fn test_start_without_load_is_rejected() {
        let (mut manager, _) = manager_with_modules();

        assert!(manager.start_module("echo").is_err());
        assert!(!manager.running_modules().contains(&"echo".to_string()));
        assert_eq!(manager.module_state("echo"), Some(ModuleState::Registered));
    }

    #[test]
    fn test_stop_of_idle_module_is_an_error_not_a_crash() {
        let (mut manager, _) = manager_with_modules();

        assert!(matches!(
            manager.stop_module("echo"),
            Err(LifecycleError::NotRunning { .. })
        ));
        manager.load_module("echo", ModuleConfig::new()).unwrap();
        assert!(manager.stop_module("echo").is_err());
        assert!(manager.stop_module("missing").is_err());

        // Still fully usable afterwards
        manager.start_module("echo").unwrap();
        manager.stop_module("echo").unwrap();
    }

    // =============================================================================
    // DEPENDENCIES
    // =============================================================================

    #[test]
    fn test_dependency_must_be_running() {
        let (mut manager, _) = manager_with_modules();
        manager.load_module("collector", ModuleConfig::new()).unwrap();

        assert!(manager.resolve_dependencies("collector").is_err());
        assert!(manager.start_module("collector").is_err());

        manager.load_module("echo", ModuleConfig::new()).unwrap();
        manager.start_module("echo").unwrap();
        assert!(manager.resolve_dependencies("collector").is_ok());
        manager.start_module("collector").unwrap();
    }

    #[test]
    fn test_start_all_brings_up_dependencies_first() {
        let (mut manager, _) = manager_with_modules();
        manager.load_module("collector", ModuleConfig::new()).unwrap();
        manager.load_module("echo", ModuleConfig::new()).unwrap();

        manager.start_all_modules().unwrap();
        assert_eq!(
            manager.running_modules(),
            vec!["collector".to_string(), "echo".to_string()]
        );
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    #[test]
    fn test_shutdown_all_twice_is_stable() {
        let (mut manager, _) = manager_with_modules();
        manager.load_module("echo", ModuleConfig::new()).unwrap();
        manager.load_module("collector", ModuleConfig::new()).unwrap();
        manager.start_all_modules().unwrap();

        manager.shutdown_all_modules().unwrap();
        let first = (manager.loaded_modules(), manager.running_modules());

        manager.shutdown_all_modules().unwrap();
        let second = (manager.loaded_modules(), manager.running_modules());

        assert_eq!(first, second);
        assert!(second.0.is_empty());
        assert!(second.1.is_empty());
        assert_eq!(manager.registered_modules().len(), 2);
    }

    // =============================================================================
    // CHOREOGRAPHY
    // =============================================================================

    #[test]
    fn test_ping_pong_through_the_bus() {
        let (mut manager, pongs) = manager_with_modules();
        manager.load_module("echo", ModuleConfig::new()).unwrap();
        manager.load_module("collector", ModuleConfig::new()).unwrap();
        manager.start_all_modules().unwrap();

        let bus = manager.bus();
        for i in 0..10 {
            if i % 2 == 0 {
                bus.publish(PING, &i.to_string());
            } else {
                bus.publish_async(PING, i.to_string());
            }
        }

        assert!(wait_for(DELIVERY_TIMEOUT, || pongs.load(Ordering::SeqCst) == 10));
        assert_eq!(
            manager.module_statuses().get("echo").map(String::as_str),
            Some("echo answered 10")
        );
    }

    #[test]
    fn test_unloaded_module_stops_receiving() {
        let (mut manager, pongs) = manager_with_modules();
        manager.load_module("echo", ModuleConfig::new()).unwrap();
        manager.load_module("collector", ModuleConfig::new()).unwrap();
        manager.start_all_modules().unwrap();
        let bus = manager.bus();

        bus.publish(PING, "before");
        assert!(wait_for(DELIVERY_TIMEOUT, || pongs.load(Ordering::SeqCst) == 1));

        manager.unload_module("echo").unwrap();
        assert_eq!(bus.subscriber_count(PING), 0);
        manager.unload_module("collector").unwrap();
        assert_eq!(bus.subscriber_count(PONG), 0);

        assert_eq!(bus.publish(PING, "after"), 0);
        assert_eq!(pongs.load(Ordering::SeqCst), 1);
    }
}
