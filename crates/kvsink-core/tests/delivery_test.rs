//! End-to-end delivery through `RedisDestDriver` with the in-memory queue and
//! the scriptable memory backend. Time is paused, so suspend deadlines are
//! exact and tests do not sleep for real. The one exception runs OS-thread
//! producers on a multi-thread runtime.

use std::sync::Arc;
use std::time::Duration;

use kvsink_core::app::{DriverBuilder, RedisDestDriver};
use kvsink_core::config::RedisDestConfig;
use kvsink_core::domain::message::{HOST, PROGRAM};
use kvsink_core::domain::{AckTracker, LogMessage, PathOptions, WorkerPhase};
use kvsink_core::impls::{InMemoryMessageQueue, MemoryStore};
use kvsink_core::template::wash_string;
use tokio::time::Instant;

const REOPEN: Duration = Duration::from_secs(5);

fn config() -> RedisDestConfig {
    RedisDestConfig {
        time_reopen_secs: REOPEN.as_secs(),
        ..RedisDestConfig::default()
    }
}

fn driver_with(config: RedisDestConfig, capacity: usize, store: &MemoryStore) -> RedisDestDriver {
    let store = store.clone();
    DriverBuilder::new(config)
        .queue(Arc::new(InMemoryMessageQueue::with_capacity(capacity)))
        .backend_factory(move || Box::new(store.backend()))
        .build()
        .unwrap()
}

fn driver(store: &MemoryStore) -> RedisDestDriver {
    driver_with(config(), 1000, store)
}

fn msg(program: &str, text: &str) -> LogMessage {
    LogMessage::new(text).with_value(PROGRAM, program)
}

/// Poll `cond` on the paused clock; fails after 100 virtual seconds.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}

fn attempted_keys(store: &MemoryStore) -> Vec<String> {
    store.attempts().into_iter().map(|a| a.key).collect()
}

#[tokio::test(start_paused = true)]
async fn failed_first_write_is_retried_before_the_next_message() {
    let store = MemoryStore::new();
    store.fail_next_writes(1);
    let mut d = driver(&store);
    let tracker = AckTracker::new();
    let options = PathOptions::with_flow_control(tracker.clone());

    d.queue(msg("a", "1"), &options);
    d.queue(msg("b", "2"), &options);
    d.init().unwrap();

    wait_until(|| d.stats().stored_messages == 2).await;

    assert_eq!(attempted_keys(&store), vec!["a:1", "a:1", "b:2"]);
    let succeeded: Vec<bool> = store.attempts().iter().map(|a| a.succeeded).collect();
    assert_eq!(succeeded, vec![false, true, true]);
    assert_eq!(store.get("a:1").as_deref(), Some("1"));
    assert_eq!(store.get("b:2").as_deref(), Some("2"));

    let stats = d.stats();
    assert_eq!(stats.stored_messages, 2);
    assert_eq!(stats.dropped_messages, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(tracker.pending(), 0);
    assert_eq!(tracker.acked(), 2);

    d.deinit().await.unwrap();
    assert_eq!(d.phase(), WorkerPhase::Terminated);
}

#[tokio::test(start_paused = true)]
async fn no_attempt_before_the_suspend_deadline() {
    let store = MemoryStore::new();
    store.fail_next_writes(1);
    let mut d = driver(&store);

    d.queue(msg("a", "1"), &PathOptions::new());
    d.init().unwrap();

    wait_until(|| d.phase() == WorkerPhase::Suspended).await;
    let failed_at = store.attempts()[0].at;

    tokio::time::sleep_until(failed_at + REOPEN - Duration::from_millis(500)).await;
    assert_eq!(store.attempts().len(), 1);
    assert_eq!(d.phase(), WorkerPhase::Suspended);

    wait_until(|| d.stats().stored_messages == 1).await;
    let retried_at = store.attempts()[1].at;
    assert!(retried_at - failed_at >= REOPEN);
    assert!(retried_at - failed_at < REOPEN + Duration::from_secs(1));

    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn arrival_wakes_a_waiting_worker() {
    let store = MemoryStore::new();
    let mut d = driver(&store);
    d.init().unwrap();

    wait_until(|| d.phase() == WorkerPhase::Waiting).await;
    let queued_at = Instant::now();
    d.queue(msg("a", "1"), &PathOptions::new());

    tokio::time::timeout(
        Duration::from_secs(1),
        wait_until(|| d.stats().stored_messages == 1),
    )
    .await
    .unwrap();
    assert!(store.attempts()[0].at - queued_at < Duration::from_secs(1));

    // and parks again
    wait_until(|| d.phase() == WorkerPhase::Waiting).await;
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn producers_on_other_tasks_wake_the_worker() {
    let store = MemoryStore::new();
    let mut d = driver(&store);
    d.init().unwrap();
    wait_until(|| d.phase() == WorkerPhase::Waiting).await;

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let handle = d.handle();
            tokio::spawn(async move {
                for i in 0..25 {
                    handle.queue(msg(&format!("p{p}"), &i.to_string()), &PathOptions::new());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    wait_until(|| d.stats().stored_messages == 100).await;
    assert_eq!(store.entries().len(), 100);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_while_waiting() {
    let store = MemoryStore::new();
    let mut d = driver(&store);
    d.init().unwrap();
    wait_until(|| d.phase() == WorkerPhase::Waiting).await;

    d.deinit().await.unwrap();
    assert_eq!(d.phase(), WorkerPhase::Terminated);
    assert!(!d.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_while_suspended_returns_before_the_deadline() {
    let store = MemoryStore::new();
    store.set_down(true);
    let mut d = driver(&store);

    d.queue(msg("a", "1"), &PathOptions::new());
    d.init().unwrap();
    wait_until(|| d.phase() == WorkerPhase::Suspended).await;

    let stop_requested = Instant::now();
    d.deinit().await.unwrap();

    assert!(Instant::now() - stop_requested < REOPEN);
    assert_eq!(d.phase(), WorkerPhase::Terminated);
    assert_eq!(store.connects(), 1);
    assert!(store.attempts().is_empty());
    // nothing was popped, nothing was lost
    assert_eq!(d.stats().queued, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_mid_delivery_finishes_the_write_and_starts_no_other() {
    let store = MemoryStore::new();
    store.set_write_delay(Some(Duration::from_secs(2)));
    let mut d = driver(&store);

    d.queue(msg("a", "1"), &PathOptions::new());
    d.queue(msg("b", "2"), &PathOptions::new());
    d.init().unwrap();

    // the first SET is in flight until t=2s
    tokio::time::sleep(Duration::from_secs(1)).await;
    d.deinit().await.unwrap();

    assert_eq!(d.phase(), WorkerPhase::Terminated);
    assert_eq!(attempted_keys(&store), vec!["a:1"]);
    assert_eq!(store.writes(), vec![("a:1".to_string(), "1".to_string())]);
    assert_eq!(d.stats().stored_messages, 1);
    assert_eq!(d.stats().queued, 1);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_mid_delivery_parks_on_an_empty_queue() {
    let store = MemoryStore::new();
    store.set_write_delay(Some(Duration::from_secs(2)));
    let mut d = driver(&store);

    d.queue(msg("a", "1"), &PathOptions::new());
    d.init().unwrap();

    // the stop signal lands while the SET is in flight and nobody is parked
    tokio::time::sleep(Duration::from_secs(1)).await;
    d.deinit().await.unwrap();
    assert_eq!(store.connects(), 1);
    assert_eq!(d.stats().queued, 0);

    store.set_write_delay(None);
    store.set_down(true);
    d.init().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(store.connects(), 1);
    assert_eq!(d.phase(), WorkerPhase::Waiting);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_connects_pop_nothing() {
    let store = MemoryStore::new();
    store.fail_next_connects(2);
    let mut d = driver(&store);
    let started = Instant::now();

    d.queue(msg("a", "1"), &PathOptions::new());
    d.init().unwrap();

    wait_until(|| d.stats().stored_messages == 1).await;

    assert_eq!(store.connects(), 3);
    assert_eq!(attempted_keys(&store), vec!["a:1"]);
    assert!(store.attempts()[0].at - started >= REOPEN * 2);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn every_message_is_delivered_despite_repeated_failures() {
    let store = MemoryStore::new();
    store.fail_next_writes(7);
    let mut d = driver(&store);
    let tracker = AckTracker::new();
    let options = PathOptions::with_flow_control(tracker.clone());

    for i in 0..20 {
        d.queue(msg("k", &format!("v{i}")), &options);
    }
    d.init().unwrap();

    tokio::time::timeout(Duration::from_secs(60), tracker.wait_idle())
        .await
        .unwrap();

    let expected: Vec<(String, String)> = (0..20)
        .map(|i| (format!("k:{}", i + 1), format!("v{i}")))
        .collect();
    assert_eq!(store.writes(), expected);
    assert_eq!(store.attempts().len(), 27);
    assert_eq!(d.stats().stored_messages, 20);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn line_breaks_are_washed_from_key_and_value() {
    let store = MemoryStore::new();
    let config = RedisDestConfig {
        key: "${HOST}".to_string(),
        ..config()
    };
    let mut d = driver_with(config, 10, &store);

    d.queue(
        LogMessage::new("line1\r\nline2\n").with_value(HOST, "a\nb"),
        &PathOptions::new(),
    );
    d.init().unwrap();
    wait_until(|| d.stats().stored_messages == 1).await;

    let writes = store.writes();
    assert_eq!(
        writes,
        vec![("a b:1".to_string(), "line1  line2 ".to_string())]
    );
    for (key, value) in writes {
        assert!(!key.contains(['\r', '\n']));
        assert!(!value.contains(['\r', '\n']));
        let mut again = value.clone();
        wash_string(&mut again);
        assert_eq!(again, value);
    }
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn overflow_is_dropped_and_the_rest_delivered() {
    let store = MemoryStore::new();
    let mut d = driver_with(config(), 2, &store);
    let tracker = AckTracker::new();
    let options = PathOptions::with_flow_control(tracker.clone());

    for i in 0..5 {
        d.queue(msg("k", &i.to_string()), &options);
    }
    let stats = d.stats();
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.dropped_messages, 3);
    assert_eq!(tracker.acked(), 3);
    assert_eq!(tracker.pending(), 2);

    d.init().unwrap();
    tracker.wait_idle().await;

    assert_eq!(
        store.writes(),
        vec![
            ("k:1".to_string(), "0".to_string()),
            ("k:2".to_string(), "1".to_string()),
        ]
    );
    assert_eq!(d.stats().dropped_messages, 3);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn without_flow_control_the_ack_does_not_wait_for_delivery() {
    let store = MemoryStore::new();
    store.set_down(true);
    let mut d = driver(&store);
    let tracker = AckTracker::new();

    d.queue(
        msg("a", "1"),
        &PathOptions::without_flow_control(tracker.clone()),
    );
    d.init().unwrap();
    wait_until(|| d.phase() == WorkerPhase::Suspended).await;

    assert_eq!(tracker.pending(), 0);
    assert_eq!(tracker.acked(), 1);
    assert_eq!(d.stats().stored_messages, 0);
    d.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn drivers_do_not_share_state() {
    let down = MemoryStore::new();
    down.set_down(true);
    let up = MemoryStore::new();

    let mut stuck = driver(&down);
    let mut healthy = driver(&up);
    stuck.init().unwrap();
    healthy.init().unwrap();

    stuck.queue(msg("a", "1"), &PathOptions::new());
    healthy.queue(msg("a", "1"), &PathOptions::new());

    wait_until(|| healthy.stats().stored_messages == 1).await;
    wait_until(|| stuck.phase() == WorkerPhase::Suspended).await;

    assert_eq!(stuck.stats().stored_messages, 0);
    assert_eq!(stuck.stats().queued, 1);
    assert_eq!(healthy.phase(), WorkerPhase::Waiting);

    stuck.deinit().await.unwrap();
    assert_eq!(healthy.phase(), WorkerPhase::Waiting);
    healthy.deinit().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_continues_the_sequence_and_reconnects() {
    let store = MemoryStore::new();
    let mut d = driver(&store);

    d.init().unwrap();
    d.queue(msg("a", "1"), &PathOptions::new());
    wait_until(|| d.stats().stored_messages == 1).await;
    d.deinit().await.unwrap();

    // a push after deinit must not touch the stopped worker
    d.queue(msg("a", "2"), &PathOptions::new());
    assert_eq!(d.stats().queued, 1);
    assert_eq!(d.seq_num().get(), 2);

    d.init().unwrap();
    wait_until(|| d.stats().stored_messages == 2).await;

    assert_eq!(
        store.writes(),
        vec![
            ("a:1".to_string(), "1".to_string()),
            ("a:2".to_string(), "2".to_string()),
        ]
    );
    assert_eq!(store.connects(), 2);
    d.deinit().await.unwrap();
    d.free();
}

/// Real threads and the real clock: producers race the worker's park and
/// wake cycle, and every message must still land.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn os_thread_producers_race_the_parking_worker() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2000;

    let store = MemoryStore::new();
    let mut d = driver_with(config(), PRODUCERS * PER_PRODUCER, &store);
    d.init().unwrap();
    let tracker = AckTracker::new();

    let threads: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handle = d.handle();
            let options = PathOptions::with_flow_control(tracker.clone());
            std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    handle.queue(msg(&format!("p{p}"), &i.to_string()), &options);
                    if i % 64 == 0 {
                        // let the worker drain and park again
                        std::thread::sleep(Duration::from_micros(200));
                    }
                }
            })
        })
        .collect();

    tokio::task::spawn_blocking(move || {
        for t in threads {
            t.join().unwrap();
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(30), tracker.wait_idle())
        .await
        .expect("worker stalled with messages pending");

    let stats = d.stats();
    assert_eq!(stats.stored_messages, (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(stats.dropped_messages, 0);
    assert_eq!(tracker.acked(), (PRODUCERS * PER_PRODUCER) as u64);
    d.deinit().await.unwrap();
}
