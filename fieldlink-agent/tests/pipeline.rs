//! Collection ticks and full agent runs against a mock collector.

mod common;

use std::time::{Duration, Instant};

use common::{METRICS, MockCollector, REGISTER, STATUS, test_agent, test_config};
use fieldlink_agent::Agent;
use fieldlink_agent::device_status::StatusProbe;
use fieldlink_agent::orchestrator::{Dispatch, TickReport};
use fieldlink_agent::queue::QueueEntry;
use fieldlink_agent_framework::shutdown;
use fieldlink_agent_framework::{Batch, DeviceStatus, MetricKind};
use tempfile::TempDir;

struct FixedProbe;

impl StatusProbe for FixedProbe {
    fn sample(&mut self, timestamp: i64) -> DeviceStatus {
        DeviceStatus {
            timestamp,
            cpu_percent: 25.0,
            memory_percent: 50.0,
            temperature_celsius: Some(40.0),
        }
    }
}

const T0: i64 = 1_700_000_000;

#[tokio::test]
async fn test_all_delivered_leaves_queue_empty() {
    let collector = MockCollector::start().await;
    let dir = TempDir::new().unwrap();
    let (_trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);
    let mut orchestrator = agent.orchestrator_with_probe(Some(Box::new(FixedProbe)));

    for tick in 0..3 {
        let report = orchestrator.collect_once(T0 + tick).await;
        assert_eq!(
            report,
            TickReport {
                sensor: Some(Dispatch::Delivered),
                device_status: Some(Dispatch::Delivered),
            }
        );
    }

    assert!(agent.store().is_empty().unwrap());
    assert_eq!(collector.calls(METRICS), 3);
    assert_eq!(collector.calls(STATUS), 3);

    // Default bench set: twenty sources per sensor batch
    assert_eq!(collector.bodies(METRICS)[0].as_array().unwrap().len(), 20);
    assert_eq!(collector.bodies(STATUS)[2]["timestamp"], T0 + 2);
}

#[tokio::test]
async fn test_all_failing_queues_one_entry_per_kind_per_tick() {
    let collector = MockCollector::start().await;
    collector.always(METRICS, 500);
    collector.always(STATUS, 500);
    let dir = TempDir::new().unwrap();
    let (_trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);
    let mut orchestrator = agent.orchestrator_with_probe(Some(Box::new(FixedProbe)));

    const TICKS: i64 = 4;
    for tick in 0..TICKS {
        let report = orchestrator.collect_once(T0 + tick).await;
        assert_eq!(
            report.sensor,
            Some(Dispatch::Queued(format!("sensor-batch-{}", T0 + tick)))
        );
        assert_eq!(
            report.device_status,
            Some(Dispatch::Queued(format!("device-status-{}", T0 + tick)))
        );
    }

    let keys = agent.store().list_keys().unwrap();
    assert_eq!(keys.len(), 2 * TICKS as usize);
    let sensor = keys
        .iter()
        .filter(|k| MetricKind::from_key(k) == MetricKind::Sensor)
        .count();
    assert_eq!(sensor, TICKS as usize);

    let entry = agent
        .store()
        .get(&QueueEntry::key_for(MetricKind::DeviceStatus, T0))
        .unwrap()
        .unwrap();
    assert_eq!(entry.status_code, Some(500));
    assert_eq!(entry.kind, MetricKind::DeviceStatus);
    assert!(matches!(entry.payload, Batch::DeviceStatus(ref s) if s.timestamp == T0));
}

#[tokio::test]
async fn test_failed_batch_is_queued_until_confirmed() {
    let collector = MockCollector::start().await;
    collector.script(METRICS, &[503], 201);
    let dir = TempDir::new().unwrap();
    let (_trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);
    let mut orchestrator = agent.orchestrator_with_probe(None);

    let report = orchestrator.collect_once(T0).await;
    let key = QueueEntry::key_for(MetricKind::Sensor, T0);
    assert_eq!(report.sensor, Some(Dispatch::Queued(key.clone())));
    assert_eq!(report.device_status, None);

    // Present as soon as the failing call returns
    let queued = agent.store().get(&key).unwrap().unwrap();
    assert_eq!(queued.status_code, Some(503));
    assert_eq!(queued.payload.len(), 20);

    let sweep = agent.retry_worker().run_cycle().await;
    assert_eq!(sweep.delivered, 1);
    assert_eq!(agent.store().get(&key).unwrap(), None);

    // The redelivered payload is the one that failed
    let bodies = collector.bodies(METRICS);
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_same_second_failures_overwrite() {
    let collector = MockCollector::start().await;
    collector.always(METRICS, 500);
    let dir = TempDir::new().unwrap();
    let (_trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);
    let mut orchestrator = agent.orchestrator_with_probe(None);

    orchestrator.collect_once(T0).await;
    orchestrator.collect_once(T0).await;

    assert_eq!(agent.store().len().unwrap(), 1);
}

#[tokio::test]
async fn test_disabled_kinds_are_skipped() {
    let collector = MockCollector::start().await;
    let dir = TempDir::new().unwrap();
    let (_trigger, token) = shutdown::channel();

    let mut config = test_config(&collector.url(), &dir.path().join("queue.redb"));
    config.sources.clear();
    config.collection.device_status = false;
    let agent = Agent::new(config, token).unwrap();

    let report = agent.orchestrator().collect_once(T0).await;

    assert_eq!(report, TickReport::default());
    assert_eq!(collector.calls(METRICS), 0);
    assert_eq!(collector.calls(STATUS), 0);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let collector = MockCollector::start().await;
    collector.always(STATUS, 500);
    let dir = TempDir::new().unwrap();

    {
        let (_trigger, token) = shutdown::channel();
        let agent = test_agent(&collector.url(), dir.path(), token);
        let mut orchestrator = agent.orchestrator_with_probe(Some(Box::new(FixedProbe)));
        orchestrator.collect_once(T0).await;
        assert_eq!(agent.store().len().unwrap(), 1);
    }

    collector.always(STATUS, 201);
    let (_trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);
    assert_eq!(
        agent.store().list_keys().unwrap(),
        vec![QueueEntry::key_for(MetricKind::DeviceStatus, T0)]
    );

    agent.retry_worker().run_cycle().await;
    assert!(agent.store().is_empty().unwrap());
}

#[tokio::test]
async fn test_agent_run_registers_collects_and_stops() {
    let collector = MockCollector::start().await;
    collector.always(METRICS, 500);
    let dir = TempDir::new().unwrap();
    let (trigger, token) = shutdown::channel();

    let mut config = test_config(&collector.url(), &dir.path().join("queue.redb"));
    config.collection.device_status = false;
    let agent = Agent::new(config, token).unwrap();
    let store = agent.store().clone();

    let run = tokio::spawn(agent.run());

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.is_empty().unwrap() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first tick never queued its batch");

    assert_eq!(collector.calls(REGISTER), 1);
    assert_eq!(collector.api_keys(METRICS)[0], "token-1");

    let started = Instant::now();
    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("agent did not stop within the latency bound")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    // Undelivered work is left for the next start
    assert!(!store.is_empty().unwrap());
}

#[tokio::test]
async fn test_agent_run_exits_if_shutdown_during_registration() {
    let collector = MockCollector::start().await;
    collector.always(REGISTER, 503);
    let dir = TempDir::new().unwrap();
    let (trigger, token) = shutdown::channel();
    let agent = test_agent(&collector.url(), dir.path(), token);

    let run = tokio::spawn(agent.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.trigger();

    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("agent did not stop while registering")
        .unwrap();
    assert_eq!(collector.calls(METRICS), 0);
}

#[tokio::test]
async fn test_ticks_keep_a_fixed_cadence_under_slow_exports() {
    let collector = MockCollector::start().await;
    // Each export eats 40% of the interval
    collector.delay(METRICS, Duration::from_millis(400));
    let dir = TempDir::new().unwrap();
    let (trigger, token) = shutdown::channel();

    let mut config = test_config(&collector.url(), &dir.path().join("queue.redb"));
    config.collection.interval_secs = 1;
    config.collection.device_status = false;
    let agent = Agent::new(config, token).unwrap();

    let run = tokio::spawn(agent.orchestrator().run());

    // Ticks at 0s, 1s and 2s; sleeping after each export would put the third
    // one at 2.8s
    tokio::time::sleep(Duration::from_millis(2300)).await;
    assert_eq!(collector.calls(METRICS), 3);

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("collection loop did not stop")
        .unwrap();
    assert_eq!(collector.calls(METRICS), 3);
}
