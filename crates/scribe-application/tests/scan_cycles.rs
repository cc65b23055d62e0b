use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scribe_application::{CycleOutcome, MONITOR_CONFIG_PATH, NotificationCenter, ScanCoordinator, TargetScanner};
use scribe_core::monitor::{MonitorConfig, MonitorConfigPatch, MonitorItem, MonitorState};
use scribe_core::{Result, ScribeError};
use scribe_execution::ProcessSupervisor;
use scribe_infrastructure::LayeredContentStore;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Returns canned items per target and counts calls.
#[derive(Default)]
struct MockScanner {
    items: Mutex<HashMap<String, Vec<MonitorItem>>>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl MockScanner {
    fn with(mut self, target: &str, items: Vec<MonitorItem>) -> Self {
        self.items.get_mut().unwrap().insert(target.to_string(), items);
        self
    }

    fn failing(mut self, target: &str) -> Self {
        self.failing.push(target.to_string());
        self
    }

    fn set(&self, target: &str, items: Vec<MonitorItem>) {
        self.items.lock().unwrap().insert(target.to_string(), items);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetScanner for MockScanner {
    async fn scan(&self, target: &str, _config: &MonitorConfig) -> Result<Vec<MonitorItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|t| t == target) {
            return Err(ScribeError::execution(format!("{target} unreachable")));
        }
        Ok(self.items.lock().unwrap().get(target).cloned().unwrap_or_default())
    }
}

fn item(id: &str, title: &str, likes: f64) -> MonitorItem {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "metrics": { "likes": likes }
    }))
    .unwrap()
}

struct Harness {
    _dir: TempDir,
    store: Arc<LayeredContentStore>,
    supervisor: Arc<ProcessSupervisor>,
    scanner: Arc<MockScanner>,
    notifications: Arc<NotificationCenter>,
    coordinator: Arc<ScanCoordinator>,
}

fn harness(scanner: MockScanner, config: MonitorConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LayeredContentStore::new(dir.path()));
    let supervisor = Arc::new(ProcessSupervisor::new());
    let scanner = Arc::new(scanner);
    let notifications = Arc::new(NotificationCenter::new());
    let coordinator = Arc::new(
        ScanCoordinator::new(
            Arc::clone(&supervisor),
            Arc::clone(&store),
            scanner.clone(),
            Arc::clone(&notifications),
        )
        .with_config(config),
    );
    Harness {
        _dir: dir,
        store,
        supervisor,
        scanner,
        notifications,
        coordinator,
    }
}

fn platforms(names: &[&str]) -> MonitorConfig {
    MonitorConfig {
        platforms: names.iter().map(|p| p.to_string()).collect(),
        ..MonitorConfig::default()
    }
}

fn scanned(outcome: CycleOutcome) -> Vec<scribe_core::monitor::ScanResult> {
    match outcome {
        CycleOutcome::Scanned(results) => results,
        other => panic!("expected a scan, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_cycle_skipped_when_supervisor_is_full() {
    let h = harness(
        MockScanner::default().with("x", vec![item("1", "a", 1.0)]),
        platforms(&["x"]),
    );

    let mut handles = Vec::new();
    for _ in 0..h.supervisor.max_concurrent() {
        handles.push(
            h.supervisor
                .spawn("sleep", &["5".to_string()], Default::default())
                .unwrap(),
        );
    }
    assert!(!h.supervisor.can_accept());

    let outcome = h.coordinator.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Busy);
    assert_eq!(h.scanner.calls(), 0);
    assert!(h.coordinator.status().last_scan.is_none());
    assert!(h.notifications.all().is_empty());

    h.supervisor.kill_all();
    for handle in handles {
        let exit = handle.wait().await.unwrap();
        assert!(exit.killed);
    }
}

#[tokio::test]
async fn test_first_pass_is_all_new_then_only_unseen_ids() {
    let h = harness(
        MockScanner::default().with("x", vec![item("1", "Rust async", 10.0), item("2", "Cooking", 5.0)]),
        platforms(&["x"]),
    );

    let results = scanned(h.coordinator.run_cycle().await);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].new_items.len(), 2);
    assert_eq!(h.notifications.all().len(), 1);
    assert_eq!(h.notifications.all()[0].title, "2 new trending items");
    assert!(h.coordinator.status().last_scan.is_some());

    // Same ids again: nothing new, no extra notification.
    let results = scanned(h.coordinator.run_cycle().await);
    assert!(!results[0].has_new());
    assert_eq!(h.notifications.all().len(), 1);

    h.scanner.set("x", vec![item("2", "Cooking", 5.0), item("3", "Gardening", 1.0)]);
    let results = scanned(h.coordinator.run_cycle().await);
    let new_ids: Vec<&str> = results[0].new_items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(new_ids, vec!["3"]);
    assert_eq!(h.notifications.all().len(), 2);
}

#[tokio::test]
async fn test_thresholds_and_keywords_are_applied() {
    let mut config = platforms(&["x"]);
    config.thresholds.insert("likes".to_string(), 100.0);
    config.keywords = vec!["rust".to_string()];
    let h = harness(
        MockScanner::default().with("x", vec![item("hot", "Rust 2026", 250.0), item("cold", "Rust tips", 3.0)]),
        config,
    );

    let results = scanned(h.coordinator.run_cycle().await);
    let ids: Vec<&str> = results[0].items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["hot"]);
    assert_eq!(results[0].items[0].matched_keywords, vec!["rust"]);
}

#[tokio::test]
async fn test_failing_target_does_not_abort_the_others() {
    let h = harness(
        MockScanner::default()
            .failing("wechat")
            .with("x", vec![item("1", "a", 1.0)]),
        platforms(&["wechat", "x"]),
    );

    let results = scanned(h.coordinator.run_cycle().await);
    assert_eq!(h.scanner.calls(), 2);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].platform, "x");
    assert!(h.coordinator.status().error.is_none());
}

#[tokio::test]
async fn test_config_file_is_reloaded_each_cycle() {
    let h = harness(
        MockScanner::default()
            .with("x", vec![item("1", "a", 1.0)])
            .with("wechat", vec![item("2", "b", 1.0)]),
        platforms(&["x"]),
    );

    let results = scanned(h.coordinator.run_cycle().await);
    assert_eq!(results[0].platform, "x");

    h.store
        .write_user(MONITOR_CONFIG_PATH, "# Monitor\n- platforms: wechat\n- keywords: b\n")
        .await
        .unwrap();
    let results = scanned(h.coordinator.run_cycle().await);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].platform, "wechat");
    assert_eq!(h.coordinator.config().keywords, vec!["b"]);
}

#[tokio::test]
async fn test_invalid_threshold_line_is_skipped_and_cycle_runs() {
    let mut config = platforms(&["x"]);
    config.thresholds.insert("likes".to_string(), 100.0);
    let h = harness(
        MockScanner::default().with("x", vec![item("hot", "Rust 2026", 250.0), item("cold", "Rust tips", 3.0)]),
        config,
    );
    h.store
        .write_user(MONITOR_CONFIG_PATH, "threshold.likes: many\n- keywords: rust\n")
        .await
        .unwrap();

    let results = scanned(h.coordinator.run_cycle().await);
    assert_eq!(h.scanner.calls(), 1);
    let ids: Vec<&str> = results[0].items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["hot"]);

    let status = h.coordinator.status();
    assert_eq!(status.state, MonitorState::Idle);
    assert!(status.error.is_none());
    assert_eq!(status.config.thresholds.get("likes"), Some(&100.0));
    assert_eq!(status.config.keywords, vec!["rust"]);
}

#[tokio::test]
async fn test_start_scans_immediately_and_lifecycle_transitions() {
    let h = harness(
        MockScanner::default().with("x", vec![item("1", "a", 1.0)]),
        platforms(&["x"]),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = h.coordinator.on_result(move |result| {
        let _ = tx.send(result.platform.clone());
    });

    h.coordinator.start(MonitorConfigPatch {
        interval_minutes: Some(60),
        ..Default::default()
    });
    let platform = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform, "x");

    let status = h.coordinator.status();
    assert!(status.config.enabled);
    assert_eq!(status.config.interval_minutes, 60);
    assert!(status.next_scan.is_some());

    assert!(h.coordinator.pause());
    assert_eq!(h.coordinator.status().state, MonitorState::Paused);
    assert!(h.coordinator.status().next_scan.is_none());
    assert_eq!(h.coordinator.run_cycle().await, CycleOutcome::Paused);

    assert!(h.coordinator.resume());
    assert_eq!(h.coordinator.status().state, MonitorState::Running);
    assert!(!h.coordinator.resume());

    h.coordinator.stop();
    let status = h.coordinator.status();
    assert_eq!(status.state, MonitorState::Idle);
    assert!(!status.config.enabled);
    assert!(!h.coordinator.pause());
}
