//! Scheduled scan coordinator.
//!
//! `ScanCoordinator` runs a recurring scan over every configured platform
//! and reports what it finds.
//!
//! # Responsibilities
//!
//! - Owning the recurring timer (`start`, `stop`, `pause`, `resume`)
//! - Skipping a cycle outright when the process supervisor is at its ceiling
//! - Reloading the monitor config file from the content store each cycle,
//!   skipping lines it cannot use
//! - Isolating per-target failures so one platform never aborts the others
//! - Tracking which item ids are new since the previous pass per target
//! - Publishing results and raising a notification for new items
//!
//! # State
//!
//! `idle -> running <-> paused`, with `scanning` entered for the length of
//! a cycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use scribe_core::monitor::{
    MonitorConfig, MonitorConfigPatch, MonitorItem, MonitorState, MonitorStatus, ScanResult,
};
use scribe_core::{EventBus, Subscription};
use scribe_execution::ProcessSupervisor;
use scribe_infrastructure::LayeredContentStore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::notifications::{NotificationCenter, new_items_notification};
use crate::scanner::TargetScanner;
use crate::schedule::Schedule;

/// Monitor configuration file, relative to the project root.
pub const MONITOR_CONFIG_PATH: &str = "assets/topics/benchmarks/monitor-config.md";
const THRESHOLD_PREFIX: &str = "threshold.";

/// What a call to [`ScanCoordinator::run_cycle`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Paused,
    /// The supervisor had no spare capacity; nothing was scanned.
    Busy,
    /// Another cycle was still running.
    InProgress,
    Scanned(Vec<ScanResult>),
}

struct CoordinatorState {
    state: MonitorState,
    config: MonitorConfig,
    last_scan: Option<DateTime<Utc>>,
    next_scan: Option<DateTime<Utc>>,
    error: Option<String>,
    timer: Option<CancellationToken>,
}

pub struct ScanCoordinator {
    supervisor: Arc<ProcessSupervisor>,
    store: Arc<LayeredContentStore>,
    scanner: Arc<dyn TargetScanner>,
    notifications: Arc<NotificationCenter>,
    state: Mutex<CoordinatorState>,
    /// Item ids reported by the previous pass, per target.
    seen: Mutex<HashMap<String, HashSet<String>>>,
    cycle: tokio::sync::Mutex<()>,
    results: EventBus<ScanResult>,
}

impl ScanCoordinator {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        store: Arc<LayeredContentStore>,
        scanner: Arc<dyn TargetScanner>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            supervisor,
            store,
            scanner,
            notifications,
            state: Mutex::new(CoordinatorState {
                state: MonitorState::Idle,
                config: MonitorConfig::default(),
                last_scan: None,
                next_scan: None,
                error: None,
                timer: None,
            }),
            seen: Mutex::new(HashMap::new()),
            cycle: tokio::sync::Mutex::new(()),
            results: EventBus::new(),
        }
    }

    /// Seeds the configuration `start` merges over.
    pub fn with_config(self, config: MonitorConfig) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.config = config.normalized();
        }
        self
    }

    /// Merges `patch` over the current config, installs the timer and runs
    /// one cycle right away. Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>, patch: MonitorConfigPatch) {
        let schedule = {
            let Ok(mut s) = self.state.lock() else {
                return;
            };
            let mut config = s.config.clone().merge(patch);
            config.enabled = true;
            s.config = config;
            s.state = MonitorState::Running;
            s.error = None;
            Schedule::from_interval(s.config.interval_minutes)
        };
        tracing::info!(%schedule, cron = %schedule.to_cron(), "[ScanCoordinator] started");
        self.install_timer(schedule, true);
    }

    pub fn stop(&self) {
        if let Ok(mut s) = self.state.lock() {
            if let Some(timer) = s.timer.take() {
                timer.cancel();
            }
            s.config.enabled = false;
            s.state = MonitorState::Idle;
            s.next_scan = None;
        }
        tracing::info!("[ScanCoordinator] stopped");
    }

    /// Stops the timer but keeps the configuration. Returns `false` when the
    /// coordinator was not started.
    pub fn pause(&self) -> bool {
        let Ok(mut s) = self.state.lock() else {
            return false;
        };
        if !s.config.enabled {
            return false;
        }
        if let Some(timer) = s.timer.take() {
            timer.cancel();
        }
        s.state = MonitorState::Paused;
        s.next_scan = None;
        tracing::info!("[ScanCoordinator] paused");
        true
    }

    /// Restarts the timer after [`pause`](Self::pause). The next cycle runs
    /// one full period later.
    pub fn resume(self: &Arc<Self>) -> bool {
        let schedule = {
            let Ok(mut s) = self.state.lock() else {
                return false;
            };
            if !s.config.enabled || s.state != MonitorState::Paused {
                return false;
            }
            s.state = MonitorState::Running;
            Schedule::from_interval(s.config.interval_minutes)
        };
        tracing::info!(%schedule, "[ScanCoordinator] resumed");
        self.install_timer(schedule, false);
        true
    }

    pub fn status(&self) -> MonitorStatus {
        match self.state.lock() {
            Ok(s) => MonitorStatus {
                state: s.state,
                last_scan: s.last_scan,
                next_scan: s.next_scan,
                error: s.error.clone(),
                config: s.config.clone(),
            },
            Err(_) => MonitorStatus {
                state: MonitorState::Error,
                last_scan: None,
                next_scan: None,
                error: Some("coordinator state poisoned".to_string()),
                config: MonitorConfig::default(),
            },
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.state
            .lock()
            .map(|s| s.config.clone())
            .unwrap_or_default()
    }

    pub fn on_result<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ScanResult) + Send + Sync + 'static,
    {
        self.results.subscribe(callback)
    }

    /// Runs one scan cycle now.
    ///
    /// Unusable config lines and failing targets are logged and skipped;
    /// neither stops the cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.current_state() == Some(MonitorState::Paused) {
            return CycleOutcome::Paused;
        }
        let Ok(_cycle) = self.cycle.try_lock() else {
            return CycleOutcome::InProgress;
        };
        if !self.supervisor.can_accept() {
            tracing::info!(
                active = self.supervisor.active_count(),
                max = self.supervisor.max_concurrent(),
                "[ScanCoordinator] supervisor at capacity, skipping cycle"
            );
            return CycleOutcome::Busy;
        }

        self.set_state(MonitorState::Scanning);
        let config = self.reload_config().await;

        let mut results = Vec::with_capacity(config.platforms.len());
        for platform in &config.platforms {
            match self.scanner.scan(platform, &config).await {
                Ok(items) => results.push(self.evaluate(platform, items, &config)),
                Err(e) => tracing::warn!(%platform, error = %e, "[ScanCoordinator] target scan failed"),
            }
        }

        if let Ok(mut s) = self.state.lock() {
            s.last_scan = Some(Utc::now());
            s.error = None;
            if s.state == MonitorState::Scanning {
                s.state = if s.config.enabled {
                    MonitorState::Running
                } else {
                    MonitorState::Idle
                };
            }
        }

        for result in &results {
            self.results.emit(result);
            if result.has_new() {
                self.notifications.send(new_items_notification(result));
            }
        }
        tracing::info!(
            targets = results.len(),
            new_items = results.iter().map(|r| r.new_items.len()).sum::<usize>(),
            "[ScanCoordinator] cycle complete"
        );
        CycleOutcome::Scanned(results)
    }

    fn install_timer(self: &Arc<Self>, schedule: Schedule, immediate: bool) {
        let token = CancellationToken::new();
        let period = schedule.period();
        if let Ok(mut s) = self.state.lock() {
            if let Some(previous) = s.timer.replace(token.clone()) {
                previous.cancel();
            }
            s.next_scan = Some(next_after(period));
        }

        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            if immediate {
                match coordinator.upgrade() {
                    Some(c) => c.tick().await,
                    None => return,
                }
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(c) = coordinator.upgrade() else {
                            break;
                        };
                        if let Ok(mut s) = c.state.lock() {
                            s.next_scan = Some(next_after(period));
                        }
                        c.tick().await;
                    }
                }
            }
            tracing::debug!("[ScanCoordinator] timer ended");
        });
    }

    async fn tick(&self) {
        if let outcome @ (CycleOutcome::Paused | CycleOutcome::Busy | CycleOutcome::InProgress) =
            self.run_cycle().await
        {
            tracing::debug!(?outcome, "[ScanCoordinator] cycle skipped");
        }
    }

    async fn reload_config(&self) -> MonitorConfig {
        let file = self.store.read_layered(MONITOR_CONFIG_PATH, None).await;
        let current = self.config();
        if file.is_empty() {
            return current;
        }

        let (config, skipped) = apply_config_file(current, &file.merged);
        for line in &skipped {
            tracing::warn!(path = MONITOR_CONFIG_PATH, %line, "[ScanCoordinator] ignoring config line");
        }
        if let Ok(mut s) = self.state.lock() {
            s.config = config.clone();
        }
        config
    }

    /// Applies thresholds, matches keywords and flags ids unseen last pass.
    fn evaluate(&self, platform: &str, items: Vec<MonitorItem>, config: &MonitorConfig) -> ScanResult {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = seen.remove(platform).unwrap_or_default();

        let items: Vec<MonitorItem> = items
            .into_iter()
            .filter(|item| item.meets_thresholds(&config.thresholds))
            .map(|mut item| {
                item.is_new = !previous.contains(&item.id);
                if item.matched_keywords.is_empty() {
                    item.matched_keywords = matching_keywords(&item.title, &config.keywords);
                }
                item
            })
            .collect();

        seen.insert(
            platform.to_string(),
            items.iter().map(|item| item.id.clone()).collect(),
        );
        ScanResult::new(platform, items)
    }

    fn current_state(&self) -> Option<MonitorState> {
        self.state.lock().ok().map(|s| s.state)
    }

    fn set_state(&self, state: MonitorState) {
        if let Ok(mut s) = self.state.lock() {
            s.state = state;
        }
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            if let Some(timer) = s.timer.take() {
                timer.cancel();
            }
        }
    }
}

fn next_after(period: std::time::Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero())
}

fn matching_keywords(title: &str, keywords: &[String]) -> Vec<String> {
    let title = title.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty() && title.contains(&k.to_lowercase()))
        .cloned()
        .collect()
}

/// Overlays the `key: value` lines of the monitor config file onto `config`.
///
/// Recognised keys are `keywords`, `platforms` and `threshold.<metric>`;
/// markdown list markers are ignored and other lines are skipped. Returns
/// the recognised lines whose value could not be used, which leave the
/// config untouched.
pub fn apply_config_file(mut config: MonitorConfig, content: &str) -> (MonitorConfig, Vec<String>) {
    let mut skipped = Vec::new();
    for raw in content.lines() {
        let line = raw.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let lower = key.to_ascii_lowercase();

        match lower.as_str() {
            "keyword" | "keywords" => config.keywords = split_list(value),
            "platform" | "platforms" => {
                let platforms = split_list(value);
                if !platforms.is_empty() {
                    config.platforms = platforms;
                }
            }
            _ if lower.starts_with(THRESHOLD_PREFIX) => {
                let metric = key[THRESHOLD_PREFIX.len()..].trim();
                match value.parse::<f64>() {
                    Ok(min) if !metric.is_empty() && min.is_finite() => {
                        config.thresholds.insert(metric.to_string(), min);
                    }
                    _ => skipped.push(line.to_string()),
                }
            }
            _ => {}
        }
    }
    (config, skipped)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_overrides() {
        let content = "# Monitor\n\n- keywords: AI writing, productivity \n- platforms: x, wechat\nthreshold.likes: 500\nnotes: ignored\n";
        let (config, skipped) = apply_config_file(MonitorConfig::default(), content);
        assert!(skipped.is_empty());
        assert_eq!(config.keywords, vec!["AI writing", "productivity"]);
        assert_eq!(config.platforms, vec!["x", "wechat"]);
        assert_eq!(config.thresholds.get("likes"), Some(&500.0));
    }

    #[test]
    fn test_config_file_without_keys_keeps_config() {
        let base = MonitorConfig {
            keywords: vec!["rust".into()],
            ..MonitorConfig::default()
        };
        let (config, skipped) = apply_config_file(base.clone(), "Just prose here.\n");
        assert_eq!(config, base);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_bad_threshold_line_is_skipped() {
        let content = "threshold.views: lots\nthreshold.likes: 10\n- keywords: rust\nthreshold.: 3\n";
        let (config, skipped) = apply_config_file(MonitorConfig::default(), content);
        assert_eq!(skipped, vec!["threshold.views: lots", "threshold.: 3"]);
        assert_eq!(config.thresholds.get("likes"), Some(&10.0));
        assert!(!config.thresholds.contains_key("views"));
        assert_eq!(config.keywords, vec!["rust"]);
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let keywords = vec!["Rust".to_string(), "go".to_string(), String::new()];
        assert_eq!(matching_keywords("Why rust wins", &keywords), vec!["Rust"]);
    }
}
