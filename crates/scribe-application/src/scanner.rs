//! Per-target scanning.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scribe_core::monitor::{MonitorConfig, MonitorItem};
use scribe_core::process::RunOptions;
use scribe_core::{Result, ScribeError};
use scribe_execution::ProcessSupervisor;

/// Environment variable carrying the comma-joined keywords to scanner commands.
pub const KEYWORDS_ENV: &str = "SCRIBE_MONITOR_KEYWORDS";
const SCAN_TIMEOUT: Duration = Duration::from_secs(300);

/// Scans one named target (a platform) and returns what it currently shows.
#[async_trait]
pub trait TargetScanner: Send + Sync {
    async fn scan(&self, target: &str, config: &MonitorConfig) -> Result<Vec<MonitorItem>>;
}

/// Runs an external command per target through the supervisor.
///
/// The command prints one JSON `MonitorItem` per stdout line. Lines that
/// don't parse are skipped. Targets without a configured command yield no
/// items.
pub struct CommandTargetScanner {
    supervisor: Arc<ProcessSupervisor>,
    commands: BTreeMap<String, Vec<String>>,
    timeout: Duration,
}

impl CommandTargetScanner {
    pub fn new(supervisor: Arc<ProcessSupervisor>, commands: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            supervisor,
            commands,
            timeout: SCAN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TargetScanner for CommandTargetScanner {
    async fn scan(&self, target: &str, config: &MonitorConfig) -> Result<Vec<MonitorItem>> {
        let Some((program, args)) = self.commands.get(target).and_then(|argv| argv.split_first()) else {
            tracing::debug!(platform = target, "[Scanner] no command configured");
            return Ok(Vec::new());
        };

        let options = RunOptions::new()
            .env(KEYWORDS_ENV, config.keywords.join(","))
            .use_proxy(true)
            .timeout(self.timeout);
        let outcome = self.supervisor.run(program, args, options).await?;
        if !outcome.success() {
            return Err(ScribeError::execution(format!(
                "scanner for '{target}' exited with code {}: {}",
                outcome.exit_code,
                outcome.stderr.trim()
            )));
        }

        Ok(parse_items(target, &outcome.stdout))
    }
}

fn parse_items(target: &str, stdout: &str) -> Vec<MonitorItem> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<MonitorItem>(line) {
            Ok(mut item) => {
                if item.platform.is_empty() {
                    item.platform = target.to_string();
                }
                Some(item)
            }
            Err(e) => {
                tracing::warn!(platform = target, error = %e, "[Scanner] skipping unparseable item");
                None
            }
        })
        .collect()
}
