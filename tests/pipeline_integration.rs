//! Integration tests for the monitoring pipeline
//!
//! These tests drive the public API end to end:
//! - Lines flowing from a source through the parser into the store
//! - Periodic traffic summaries
//! - Alert transitions with hysteresis
//! - Fail-fast shutdown on store failure
//! - File tailing

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kuba_logmon::aggregation::Aggregator;
use kuba_logmon::alerting::{AlertConfig, AlertState};
use kuba_logmon::engine::{MemoryStore, TimeSeriesStore};
use kuba_logmon::error::{Error, StoreError};
use kuba_logmon::ingestion::{ChannelLineSource, FileTailer, TailerConfig};
use kuba_logmon::services::ServiceStatus;
use kuba_logmon::types::{LabelSet, TimeRange};
use kuba_logmon::{Monitor, MonitorConfig, MonitorEvent, RankedEntry};
use tokio::sync::mpsc;

// ============================================================================
// Helper Functions
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// A line without a timestamp; it is stored at ingestion time
fn untimed_line(host: &str, user: &str, method: &str, url: &str, status: u16) -> String {
    format!(
        "{} - {} - \"{} {} HTTP/1.1\" {} 512",
        host, user, method, url, status
    )
}

fn alert(name: &str, window: Duration, threshold: f64) -> AlertConfig {
    AlertConfig {
        name: name.to_string(),
        check_interval: Duration::from_millis(50),
        window,
        threshold,
        label: "host".to_string(),
        pattern: ".*".to_string(),
    }
}

struct Harness {
    monitor: Monitor,
    store: Arc<MemoryStore>,
    lines: mpsc::Sender<String>,
    events: mpsc::UnboundedReceiver<MonitorEvent>,
}

fn harness(config: MonitorConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (lines, source) = ChannelLineSource::new(64);
    let (events_tx, events) = mpsc::unbounded_channel();

    let monitor = Monitor::new(
        config,
        store.clone(),
        Box::new(source),
        Arc::new(events_tx),
    )
    .expect("Failed to build monitor");

    Harness {
        monitor,
        store,
        lines,
        events,
    }
}

async fn next_alert(events: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> MonitorEvent {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("Timed out waiting for alert")
            .expect("Event channel closed");
        if matches!(event, MonitorEvent::Alert(_)) {
            return event;
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_top_entries_orders_by_weight() {
    let store = Arc::new(MemoryStore::new());
    let t0 = Utc::now().timestamp_millis() - 1_000;

    let a = LabelSet::from_iter([("host", "A")]);
    let b = LabelSet::from_iter([("host", "B")]);
    store.add(&a, t0, 1.0).await.unwrap();
    store.add(&a, t0 + 1_000, 1.0).await.unwrap();
    store.add(&b, t0, 1.0).await.unwrap();

    let aggregator = Aggregator::new(store);
    let range = TimeRange::new(t0, t0 + 1_000).unwrap();
    let expected = vec![RankedEntry::new("A", 2.0), RankedEntry::new("B", 1.0)];

    let top = aggregator.top_entries("host", ".*", range, 2).await.unwrap();
    assert_eq!(top, expected);

    // The upper bound is inclusive; an earlier end loses A's second point
    let early = TimeRange::new(t0, t0 + 999).unwrap();
    let top = aggregator.top_entries("host", ".*", early, 2).await.unwrap();
    assert_eq!(top, vec![RankedEntry::new("A", 1.0), RankedEntry::new("B", 1.0)]);

    let top_one = aggregator.top_entries("host", ".*", range, 1).await.unwrap();
    assert_eq!(top_one, vec![RankedEntry::new("A", 2.0)]);

    // Limits beyond the entry count return everything
    let all = aggregator
        .top_entries("host", ".*", range, usize::MAX)
        .await
        .unwrap();
    assert_eq!(all, expected);

    let only_b = aggregator.get_entries("host", "B", range).await.unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b.get("B"), Some(&1.0));

    let bad = aggregator.top_entries("host", "(", range, 0).await;
    assert!(matches!(bad, Err(Error::Config(_))));
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_pipeline_reports_stats() {
    let Harness {
        monitor,
        store: _store,
        lines,
        mut events,
    } = harness(MonitorConfig {
        stats_interval: Duration::from_secs(1),
        ..MonitorConfig::default()
    });

    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    lines.send(untimed_line("10.0.0.1", "james", "GET", "/api/users", 200)).await.unwrap();
    lines.send(untimed_line("10.0.0.2", "james", "GET", "/api/orders", 200)).await.unwrap();
    lines.send(untimed_line("10.0.0.1", "frank", "POST", "/api/users", 404)).await.unwrap();
    lines.send(untimed_line("10.0.0.3", "-", "GET", "/report", 500)).await.unwrap();
    lines.send("not an access log line".to_string()).await.unwrap();

    let summary = loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("Timed out waiting for summary")
            .expect("Event channel closed");
        match event {
            MonitorEvent::Stats(summary) if summary.total_requests() > 0.0 => break summary,
            _ => continue,
        }
    };

    assert_eq!(summary.total_requests(), 4.0);
    assert_eq!(summary.top_sections[0], RankedEntry::new("/api", 3.0));
    assert_eq!(summary.top_users[0], RankedEntry::new("james", 2.0));
    assert_eq!(summary.request_methods[0], RankedEntry::new("GET", 3.0));

    let breakdown = summary.status_breakdown();
    assert_eq!(breakdown.successful, 2.0);
    assert_eq!(breakdown.client_errors, 1.0);
    assert_eq!(breakdown.server_errors, 1.0);

    let ingestion = monitor.ingestion().stats();
    assert_eq!(ingestion.lines_ingested, 4);
    assert_eq!(ingestion.lines_rejected, 1);

    monitor.stop().await.unwrap();
}

#[tokio::test]
async fn test_alert_fires_and_recovers() {
    let Harness {
        monitor,
        store: _store,
        lines,
        mut events,
    } = harness(MonitorConfig {
        alerts: vec![alert("high_traffic", Duration::from_secs(1), 5.0)],
        ..MonitorConfig::default()
    });

    monitor.start().unwrap();
    for i in 0..10 {
        let host = format!("10.0.0.{}", i);
        lines.send(untimed_line(&host, "-", "GET", "/", 200)).await.unwrap();
    }

    match next_alert(&mut events).await {
        MonitorEvent::Alert(event) => {
            assert_eq!(event.name, "high_traffic");
            assert_eq!(event.state, AlertState::Critical);
            assert!(event.average >= 5.0);
        },
        _ => unreachable!(),
    }
    assert_eq!(monitor.alerts()[0].alert_state().await, AlertState::Critical);

    // Traffic stops; the window drains and the alert recovers once
    match next_alert(&mut events).await {
        MonitorEvent::Alert(event) => {
            assert_eq!(event.state, AlertState::Ok);
            assert!(event.average < 5.0);
        },
        _ => unreachable!(),
    }

    monitor.stop().await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_alert_pattern_limits_scope() {
    let mut config = alert("internal", Duration::from_secs(1), 1.0);
    config.pattern = r"10\.0\..*".to_string();

    let Harness {
        monitor,
        store: _store,
        lines,
        mut events,
    } = harness(MonitorConfig {
        alerts: vec![config],
        ..MonitorConfig::default()
    });

    monitor.start().unwrap();
    for _ in 0..10 {
        lines
            .send(untimed_line("192.168.1.1", "-", "GET", "/", 200))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(monitor.alerts()[0].alert_state().await, AlertState::Ok);

    monitor.stop().await.unwrap();
}

// ============================================================================
// Failure Propagation
// ============================================================================

#[tokio::test]
async fn test_store_failure_stops_pipeline() {
    let Harness {
        monitor,
        store,
        lines,
        events: _events,
    } = harness(MonitorConfig {
        alerts: vec![alert("high_traffic", Duration::from_secs(60), 10.0)],
        ..MonitorConfig::default()
    });

    monitor.start().unwrap();
    store.cleanup().await.unwrap();

    lines
        .send(untimed_line("10.0.0.1", "-", "GET", "/", 200))
        .await
        .unwrap();

    let error = tokio::time::timeout(WAIT, monitor.wait_for_failure())
        .await
        .expect("Timed out waiting for failure");
    assert!(matches!(error, Error::Store(StoreError::Closed)));

    let result = monitor.stop().await;
    assert!(matches!(result, Err(Error::Store(StoreError::Closed))));

    // Every service has exited
    assert!(monitor
        .status()
        .values()
        .all(|s| matches!(s, ServiceStatus::Stopped | ServiceStatus::Failed(_))));

    // Stopping again is a no-op
    assert!(monitor.stop().await.is_ok());
}

#[tokio::test]
async fn test_stop_closes_store() {
    let Harness {
        monitor,
        store,
        lines: _lines,
        events: _events,
    } = harness(MonitorConfig::default());

    monitor.start().unwrap();
    monitor.stop().await.unwrap();

    assert!(store.stats().closed);
    let labels = LabelSet::from_iter([("host", "10.0.0.1")]);
    assert_eq!(store.add(&labels, 0, 1.0).await, Err(StoreError::Closed));
}

// ============================================================================
// File Tailing
// ============================================================================

#[tokio::test]
async fn test_tails_file_into_store() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"127.0.0.1 - james [09/May/2018:16:00:39 +0000] "GET /report HTTP/1.0" 200 123"#
    )
    .unwrap();
    writeln!(
        file,
        r#"127.0.0.1 - jill [09/May/2018:16:00:41 +0000] "GET /api/user HTTP/1.0" 200 234"#
    )
    .unwrap();
    file.flush().unwrap();

    let store = Arc::new(MemoryStore::new());
    let source = FileTailer::with_config(
        &path,
        TailerConfig {
            poll_interval: Duration::from_millis(10),
            start_at_end: false,
        },
    );
    let (events_tx, _events) = mpsc::unbounded_channel();
    let monitor = Monitor::new(
        MonitorConfig::default(),
        store.clone(),
        Box::new(source),
        Arc::new(events_tx),
    )
    .unwrap();
    monitor.start().unwrap();

    writeln!(
        file,
        r#"127.0.0.1 - frank [09/May/2018:16:00:42 +0000] "POST /api/user HTTP/1.0" 200 34"#
    )
    .unwrap();
    file.flush().unwrap();

    tokio::time::timeout(WAIT, async {
        while monitor.ingestion().stats().lines_ingested < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timed out waiting for tailed lines");

    let aggregator = Aggregator::new(store);
    let since = chrono::DateTime::parse_from_rfc3339("2018-05-09T16:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let until = since + chrono::Duration::minutes(1);
    let range = TimeRange::between(since, until).unwrap();

    let sections = aggregator.top_entries("section", ".*", range, 0).await.unwrap();
    assert_eq!(
        sections,
        vec![RankedEntry::new("/api", 2.0), RankedEntry::new("/report", 1.0)]
    );

    monitor.stop().await.unwrap();
}
