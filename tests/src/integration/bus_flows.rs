//! # Bus Flows
//!
//! Delivery guarantees of `swarm-bus` exercised from outside the crate:
//!
//! 1. **Fan-out**: every subscriber of a topic runs once, in subscription order
//! 2. **Async equivalence**: `publish_async` ends up as one `publish`
//! 3. **Topic isolation**: handlers never see other topics
//! 4. **Counter**: `message_count` grows by one per delivered publish
//! 5. **Fault isolation**: a panicking handler blocks nobody

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use rand::Rng;
    use swarm_bus::{BusConfig, MessageBus};

    use crate::integration::{wait_for, DELIVERY_TIMEOUT};

    type Calls = Arc<Mutex<Vec<(usize, String, String)>>>;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn started_bus() -> MessageBus {
        swarm_telemetry::init_test_logging();
        let bus = MessageBus::with_config(BusConfig::with_poll_interval(Duration::from_millis(5)));
        bus.start();
        bus
    }

    /// Subscribe `count` recording handlers to `topic`; handler `i` records
    /// its index. Handlers whose index is in `panicking` panic after
    /// recording.
    fn subscribe_recorders(bus: &MessageBus, topic: &str, count: usize, panicking: &[usize]) -> Calls {
        let calls = Calls::default();
        for index in 0..count {
            let calls = Arc::clone(&calls);
            let panics = panicking.contains(&index);
            bus.subscribe(topic, move |topic, payload| {
                calls.lock().push((index, topic.to_string(), payload.to_string()));
                if panics {
                    panic!("handler {index} failed");
                }
            });
        }
        calls
    }

    // =============================================================================
    // FAN-OUT
    // =============================================================================

    #[test]
    fn test_fan_out_reaches_every_subscriber_in_order() {
        let bus = started_bus();
        let mut rng = rand::thread_rng();

        for round in 0..20 {
            let topic = format!("fanout.{round}");
            let count = rng.gen_range(1..=12);
            let panicking: Vec<usize> = (0..count).filter(|_| rng.gen_bool(0.3)).collect();
            let calls = subscribe_recorders(&bus, &topic, count, &panicking);

            assert_eq!(bus.publish(&topic, "payload"), count);

            let calls = calls.lock();
            let order: Vec<usize> = calls.iter().map(|(index, _, _)| *index).collect();
            assert_eq!(order, (0..count).collect::<Vec<_>>());
            assert!(calls
                .iter()
                .all(|(_, t, p)| *t == topic && p == "payload"));
        }
    }

    #[test]
    fn test_health_status_reaches_both_handlers() {
        let bus = started_bus();
        let calls = subscribe_recorders(&bus, "health.status", 2, &[]);

        bus.publish("health.status", "{\"ok\":true}");

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, calls[1].1);
        assert_eq!(calls[0].2, calls[1].2);
        assert_eq!(calls[0].2, "{\"ok\":true}");
        assert_eq!(bus.message_count(), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_block_counter() {
        let bus = started_bus();
        let counter = Arc::new(AtomicU64::new(0));

        bus.subscribe("faulty", |_, _| panic!("always fails"));
        {
            let counter = Arc::clone(&counter);
            bus.subscribe("faulty", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish("faulty", "x");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Same through the dispatch thread, which must survive the panic
        bus.publish_async("faulty", "y");
        bus.publish_async("faulty", "z");
        assert!(wait_for(DELIVERY_TIMEOUT, || counter.load(Ordering::SeqCst) == 3));
        assert!(bus.is_running());
    }

    // =============================================================================
    // ASYNC DELIVERY
    // =============================================================================

    #[test]
    fn test_async_publish_matches_sync_publish() {
        let sync_bus = started_bus();
        let async_bus = started_bus();
        let sync_calls = subscribe_recorders(&sync_bus, "topic", 3, &[1]);
        let async_calls = subscribe_recorders(&async_bus, "topic", 3, &[1]);

        sync_bus.publish("topic", "same");
        async_bus.publish_async("topic", "same");

        assert!(wait_for(DELIVERY_TIMEOUT, || async_bus.message_count() == 1));
        assert_eq!(*async_calls.lock(), *sync_calls.lock());
        assert_eq!(async_bus.message_count(), sync_bus.message_count());
    }

    #[test]
    fn test_async_messages_keep_publisher_order() {
        let bus = started_bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe("x", move |_, payload| seen.lock().push(payload.to_string()));
        }

        bus.publish_async("x", "1");
        bus.publish_async("x", "2");

        assert!(wait_for(DELIVERY_TIMEOUT, || seen.lock().len() == 2));
        assert_eq!(*seen.lock(), vec!["1", "2"]);
    }

    #[test]
    fn test_async_publish_waits_for_start() {
        swarm_telemetry::init_test_logging();
        let bus = MessageBus::new();
        let calls = subscribe_recorders(&bus, "queued", 1, &[]);

        bus.publish_async("queued", "early");
        std::thread::sleep(Duration::from_millis(20));
        assert!(calls.lock().is_empty());
        assert_eq!(bus.pending_messages(), 1);

        bus.start();
        assert!(wait_for(DELIVERY_TIMEOUT, || calls.lock().len() == 1));
        assert_eq!(bus.pending_messages(), 0);
    }

    #[test]
    fn test_stop_drops_queued_messages() {
        let bus = Arc::new(started_bus());
        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            bus.subscribe("slow", move |_, _| {
                entered.store(true, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            });
        }
        let lost = subscribe_recorders(&bus, "lost", 1, &[]);

        // Park the dispatch thread inside a handler, then queue behind it
        bus.publish_async("slow", "1");
        assert!(wait_for(DELIVERY_TIMEOUT, || entered.load(Ordering::SeqCst)));
        bus.publish_async("lost", "1");
        bus.publish_async("lost", "2");

        let stopper = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || bus.stop())
        };
        assert!(wait_for(DELIVERY_TIMEOUT, || !bus.is_running()));
        release.store(true, Ordering::SeqCst);
        stopper.join().unwrap();

        assert_eq!(bus.pending_messages(), 0);
        assert_eq!(bus.message_count(), 1);
        assert!(lost.lock().is_empty());
    }

    // =============================================================================
    // ISOLATION AND COUNTING
    // =============================================================================

    #[test]
    fn test_topics_are_isolated() {
        let bus = started_bus();
        let a = subscribe_recorders(&bus, "topic.a", 2, &[]);
        let b = subscribe_recorders(&bus, "topic.b", 2, &[]);

        bus.publish("topic.a", "for-a");
        bus.publish_async("topic.a", "for-a-async");
        assert!(wait_for(DELIVERY_TIMEOUT, || a.lock().len() == 4));

        assert!(b.lock().is_empty());
        assert!(a.lock().iter().all(|(_, topic, _)| topic == "topic.a"));
    }

    #[test]
    fn test_message_count_is_monotonic() {
        let bus = started_bus();
        subscribe_recorders(&bus, "counted", 1, &[0]);
        let mut rng = rand::thread_rng();

        let mut expected = 0u64;
        let mut last = 0u64;
        for _ in 0..50 {
            if rng.gen_bool(0.5) {
                bus.publish("counted", "sync");
            } else {
                bus.publish_async("counted", "async");
            }
            expected += 1;

            let now = bus.message_count();
            assert!(now >= last);
            last = now;
        }

        assert!(wait_for(DELIVERY_TIMEOUT, || bus.message_count() == expected));
    }

    #[test]
    fn test_unsubscribe_cancels_only_one_handler() {
        let bus = started_bus();
        let calls = Calls::default();

        let ids: Vec<_> = (0..3)
            .map(|index| {
                let calls = Arc::clone(&calls);
                bus.subscribe("shared", move |topic, payload| {
                    calls.lock().push((index, topic.to_string(), payload.to_string()));
                })
            })
            .collect();

        assert!(bus.unsubscribe(ids[1]));
        assert!(!bus.unsubscribe(ids[1]));
        bus.publish("shared", "after");

        let order: Vec<usize> = calls.lock().iter().map(|(index, _, _)| *index).collect();
        assert_eq!(order, vec![0, 2]);

        assert_eq!(bus.unsubscribe_all("shared"), 2);
        assert_eq!(bus.publish("shared", "gone"), 0);
    }

    #[test]
    fn test_handler_may_publish_and_subscribe() {
        let bus = Arc::new(started_bus());
        let echoes = Arc::new(AtomicU64::new(0));
        {
            let echoes = Arc::clone(&echoes);
            bus.subscribe("echo", move |_, _| {
                echoes.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let weak = Arc::downgrade(&bus);
            bus.subscribe("ping", move |_, payload| {
                if let Some(bus) = weak.upgrade() {
                    bus.publish("echo", payload);
                    bus.subscribe("late", |_, _| {});
                }
            });
        }

        bus.publish("ping", "1");
        bus.publish_async("ping", "2");

        assert!(wait_for(DELIVERY_TIMEOUT, || echoes.load(Ordering::SeqCst) == 2));
        assert_eq!(bus.subscriber_count("late"), 2);
    }
}
