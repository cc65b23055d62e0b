//! Process-wide service graph.

use std::path::PathBuf;
use std::sync::Arc;

use scribe_core::agent::ErrorEvent;
use scribe_core::monitor::MonitorConfigPatch;
use scribe_core::notification::{AppNotification, NotificationKind};
use scribe_core::{Result, ScribeError, Subscription};
use scribe_execution::ProcessSupervisor;
use scribe_infrastructure::{ContentWatcher, LayeredContentStore, ScribePaths, SettingsService};
use scribe_interaction::{AgentBridge, BinaryResolver};

use crate::coordinator::ScanCoordinator;
use crate::notifications::NotificationCenter;
use crate::scanner::{CommandTargetScanner, TargetScanner};

/// Every long-lived service, constructed once and shared by `Arc`.
pub struct AppServices {
    pub settings: Arc<SettingsService>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub bridge: Arc<AgentBridge>,
    pub store: Arc<LayeredContentStore>,
    pub watcher: Arc<ContentWatcher>,
    pub coordinator: Arc<ScanCoordinator>,
    pub notifications: Arc<NotificationCenter>,
    project_root: PathBuf,
    _subscriptions: Vec<Subscription>,
}

impl AppServices {
    /// Builds the services from persisted settings, scanning with the
    /// configured scanner commands.
    pub async fn bootstrap(settings: Arc<SettingsService>) -> Result<Self> {
        let supervisor = Arc::new(ProcessSupervisor::new());
        let scanner = Arc::new(CommandTargetScanner::new(
            Arc::clone(&supervisor),
            settings.get().scanner_commands,
        ));
        Self::bootstrap_with(settings, supervisor, scanner).await
    }

    /// Same as [`bootstrap`](Self::bootstrap) with caller-supplied collaborators.
    pub async fn bootstrap_with(
        settings: Arc<SettingsService>,
        supervisor: Arc<ProcessSupervisor>,
        scanner: Arc<dyn TargetScanner>,
    ) -> Result<Self> {
        let current = settings.get();

        // 1. Project root
        let project_root = match &current.project_path {
            Some(path) => path.clone(),
            None => ScribePaths::default_project_root()
                .map_err(|e| ScribeError::config(format!("cannot determine project root: {e}")))?,
        };
        tokio::fs::create_dir_all(&project_root).await?;
        tracing::info!(root = %project_root.display(), "[Bootstrap] project root ready");

        // 2. Execution and agent
        supervisor.set_proxy(current.proxy());
        let bridge = Arc::new(
            AgentBridge::new(Arc::clone(&supervisor), BinaryResolver::new())
                .with_default_cwd(&project_root),
        );

        // 3. Content
        let store = Arc::new(LayeredContentStore::new(&project_root));
        let watcher = Arc::new(ContentWatcher::new()?);

        // 4. Monitoring
        let notifications = Arc::new(NotificationCenter::new());
        let coordinator = Arc::new(
            ScanCoordinator::new(
                Arc::clone(&supervisor),
                Arc::clone(&store),
                scanner,
                Arc::clone(&notifications),
            )
            .with_config(current.monitor.clone()),
        );

        let agent_errors = Arc::clone(&notifications);
        let subscriptions = vec![bridge.on_error(move |event: &ErrorEvent| {
            agent_errors.send(
                AppNotification::new(NotificationKind::Agent, "Agent session failed", event.error.clone())
                    .with_data(serde_json::json!({ "sessionId": event.session_id })),
            );
        })];

        if current.monitor.enabled {
            tracing::info!("[Bootstrap] monitor enabled in settings, starting");
            coordinator.start(MonitorConfigPatch::default());
        }

        tracing::info!("[Bootstrap] services ready");
        Ok(Self {
            settings,
            supervisor,
            bridge,
            store,
            watcher,
            coordinator,
            notifications,
            project_root,
            _subscriptions: subscriptions,
        })
    }

    pub fn project_root(&self) -> &std::path::Path {
        &self.project_root
    }

    /// Stops background work and signals every child process. Does not wait
    /// for the processes to exit.
    pub fn shutdown(&self) {
        self.coordinator.stop();
        self.watcher.stop();
        let sessions = self.bridge.cancel_all();
        let processes = self.supervisor.kill_all();
        tracing::info!(sessions, processes, "[Bootstrap] shutdown complete");
    }
}
