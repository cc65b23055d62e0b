//! Agent session bridge.
//!
//! Turns a query into a supervised agent process, feeds its stdout through
//! [`LineBuffer`] and [`StreamNormalizer`], and fans the resulting messages
//! out to subscribers. Each session ends with exactly one `complete` or
//! `error` event, except for cancelled sessions which end silently.
//!
//! Every forward checks the session's active flag and run epoch under the
//! session lock, and checks them again right before publishing. Output that
//! is still in flight when a session is cancelled (or superseded by a new
//! query reusing its id) is dropped there. A cancel that lands after the
//! second check can still see that one message published.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use scribe_core::agent::{
    AgentMessage, CompleteEvent, ErrorEvent, MessageRole, PermissionDecision, PermissionRequest,
    QueryOptions, SessionId, SessionPhase, SessionSnapshot, StreamEvent,
};
use scribe_core::process::{OutputStream, ProcessExit, ProcessId, RunOptions};
use scribe_core::{EventBus, Result, Subscription};
use scribe_execution::ProcessSupervisor;
use tokio::sync::OnceCell;

use crate::resolver::{BinaryResolver, ResolvedBinary};
use crate::stream::{LineBuffer, StreamNormalizer};

const STDERR_PREFIX: &str = "[stderr]";

struct SessionState {
    phase: SessionPhase,
    active: bool,
    messages: Vec<AgentMessage>,
    process: Option<ProcessId>,
    /// Distinguishes runs that reuse the same session id.
    epoch: u64,
}

type Sessions = Arc<Mutex<HashMap<SessionId, SessionState>>>;

pub struct AgentBridge {
    supervisor: Arc<ProcessSupervisor>,
    resolver: BinaryResolver,
    binary: OnceCell<ResolvedBinary>,
    default_cwd: Option<PathBuf>,
    sessions: Sessions,
    next_epoch: AtomicU64,
    stream_events: EventBus<StreamEvent>,
    permission_events: EventBus<PermissionRequest>,
    complete_events: EventBus<CompleteEvent>,
    error_events: EventBus<ErrorEvent>,
}

impl AgentBridge {
    pub fn new(supervisor: Arc<ProcessSupervisor>, resolver: BinaryResolver) -> Self {
        Self {
            supervisor,
            resolver,
            binary: OnceCell::new(),
            default_cwd: None,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_epoch: AtomicU64::new(1),
            stream_events: EventBus::new(),
            permission_events: EventBus::new(),
            complete_events: EventBus::new(),
            error_events: EventBus::new(),
        }
    }

    /// Working directory for queries that don't name one.
    pub fn with_default_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.default_cwd = Some(cwd.into());
        self
    }

    /// Registers a session and starts the agent in the background.
    ///
    /// Returns before the process is spawned. Everything that happens
    /// afterwards, failures included, is reported through the subscriptions.
    pub fn query(self: &Arc<Self>, options: QueryOptions) -> SessionId {
        let id = options.session_id.clone().unwrap_or_else(SessionId::generate);
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let superseded = self.with_sessions(|sessions| {
            let previous = sessions.remove(&id);
            let (messages, process) = match previous {
                Some(prev) => (prev.messages, prev.process),
                None => (Vec::new(), None),
            };
            sessions.insert(
                id.clone(),
                SessionState {
                    phase: SessionPhase::Created,
                    active: true,
                    messages,
                    process: None,
                    epoch,
                },
            );
            process
        });
        if let Some(process) = superseded.flatten() {
            tracing::warn!(session_id = %id, process_id = %process, "[AgentBridge] session reused while running, stopping previous run");
            self.supervisor.kill(process);
        }

        tracing::info!(session_id = %id, prompt_len = options.prompt.len(), "[AgentBridge] query accepted");

        let bridge = Arc::clone(self);
        let session_id = id.clone();
        tokio::spawn(async move {
            bridge.run(session_id, epoch, options).await;
        });
        id
    }

    /// Marks a session inactive and signals its process.
    ///
    /// Returns `false` when the session is unknown or already inactive.
    pub fn cancel(&self, id: &SessionId) -> bool {
        let process = self.with_sessions(|sessions| match sessions.get_mut(id) {
            Some(state) if state.active => {
                state.active = false;
                state.phase.transition(SessionPhase::Cancelled);
                Some(state.process.take())
            }
            _ => None,
        });
        let Some(process) = process.flatten() else {
            return false;
        };

        tracing::info!(session_id = %id, "[AgentBridge] cancelled");
        if let Some(process) = process {
            self.supervisor.kill(process);
        }
        true
    }

    pub fn cancel_all(&self) -> usize {
        self.active_sessions()
            .iter()
            .filter(|id| self.cancel(id))
            .count()
    }

    /// The agent runs non-interactively, so decisions are only recorded.
    pub fn respond_to_permission(&self, request_id: &str, decision: PermissionDecision) {
        tracing::info!(request_id, ?decision, "[AgentBridge] permission response ignored in non-interactive mode");
    }

    pub fn on_stream<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.stream_events.subscribe(callback)
    }

    pub fn on_permission_request<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PermissionRequest) + Send + Sync + 'static,
    {
        self.permission_events.subscribe(callback)
    }

    pub fn on_complete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CompleteEvent) + Send + Sync + 'static,
    {
        self.complete_events.subscribe(callback)
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.error_events.subscribe(callback)
    }

    pub fn session(&self, id: &SessionId) -> Option<SessionSnapshot> {
        self.with_sessions(|sessions| {
            sessions.get(id).map(|state| SessionSnapshot {
                id: id.clone(),
                phase: state.phase,
                active: state.active,
                messages: state.messages.clone(),
            })
        })
        .flatten()
    }

    /// Ids of sessions that have not finished or been cancelled, sorted.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .with_sessions(|sessions| {
                sessions
                    .iter()
                    .filter(|(_, state)| state.active)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    async fn binary(&self) -> &ResolvedBinary {
        self.binary.get_or_init(|| self.resolver.resolve()).await
    }

    async fn run(&self, id: SessionId, epoch: u64, options: QueryOptions) {
        let program = self.binary().await.path.to_string_lossy().into_owned();
        let args = build_args(&options);

        let mut run_options = RunOptions::new().env(
            "PATH",
            self.resolver.extended_path().to_string_lossy().into_owned(),
        );
        if let Some(cwd) = options.cwd.as_ref().or(self.default_cwd.as_ref()) {
            run_options = run_options.cwd(cwd);
        }

        let started = self
            .with_live_session(&id, epoch, |state| {
                state.phase.transition(SessionPhase::Running);
            })
            .is_some();
        if !started {
            tracing::debug!(session_id = %id, "[AgentBridge] cancelled before spawn");
            self.release(&id, epoch);
            return;
        }

        let mut process = match self.supervisor.spawn(&program, &args, run_options) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(session_id = %id, program, error = %e, "[AgentBridge] failed to start agent");
                self.fail(&id, epoch, e.to_string());
                return;
            }
        };

        let attached = self
            .with_live_session(&id, epoch, |state| {
                state.process = Some(process.id);
            })
            .is_some();
        if !attached {
            self.supervisor.kill(process.id);
        }
        tracing::debug!(session_id = %id, process_id = %process.id, pid = ?process.pid, "[AgentBridge] agent running");

        let mut lines = LineBuffer::new();
        let mut normalizer = StreamNormalizer::new();
        let mut transcript = Vec::new();

        while let Some(chunk) = process.next_chunk().await {
            match chunk.stream {
                OutputStream::Stdout => {
                    for line in lines.push(&chunk.bytes) {
                        if let Some(message) = normalizer.normalize_line(&line) {
                            self.forward(&id, epoch, message, &mut transcript);
                        }
                    }
                }
                OutputStream::Stderr => {
                    let text = String::from_utf8_lossy(&chunk.bytes);
                    if !text.trim().is_empty() {
                        let message = AgentMessage::system(format!("{STDERR_PREFIX} {}", text.trim_end()));
                        self.forward(&id, epoch, message, &mut transcript);
                    }
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let Some(message) = normalizer.normalize_line(&line) {
                self.forward(&id, epoch, message, &mut transcript);
            }
        }

        let exit = process.wait().await;
        self.finish(&id, epoch, exit, transcript);
    }

    /// Appends and publishes `message` if the run is still live.
    fn forward(&self, id: &SessionId, epoch: u64, message: AgentMessage, transcript: &mut Vec<String>) {
        let recorded = self
            .with_live_session(id, epoch, |state| state.messages.push(message.clone()))
            .is_some();
        // Subscribers run outside the lock, so a cancel may slip in between.
        if !recorded || !self.is_live(id, epoch) {
            tracing::trace!(session_id = %id, "[AgentBridge] dropped output of inactive session");
            return;
        }
        if message.role == MessageRole::Assistant {
            transcript.push(message.content.clone());
        }
        self.stream_events.emit(&StreamEvent {
            session_id: id.clone(),
            message,
        });
    }

    fn finish(&self, id: &SessionId, epoch: u64, exit: Result<ProcessExit>, transcript: Vec<String>) {
        let succeeded = matches!(&exit, Ok(e) if e.success());
        let phase = self
            .with_sessions(|sessions| {
                let state = sessions.get_mut(id).filter(|s| s.epoch == epoch)?;
                if state.active {
                    state.phase.transition(if succeeded {
                        SessionPhase::Completed
                    } else {
                        SessionPhase::Errored
                    });
                }
                let phase = state.phase;
                sessions.remove(id);
                Some(phase)
            })
            .flatten();

        match (phase, exit) {
            (Some(SessionPhase::Completed), _) => {
                tracing::info!(session_id = %id, "[AgentBridge] completed");
                self.complete_events.emit(&CompleteEvent {
                    session_id: id.clone(),
                    result: transcript.join("\n"),
                });
            }
            (Some(SessionPhase::Errored), Ok(exit)) => {
                tracing::warn!(session_id = %id, exit_code = exit.exit_code, "[AgentBridge] agent failed");
                self.emit_error(id, format!("Agent CLI exited with code {}", exit.exit_code), Some(exit.exit_code));
            }
            (Some(SessionPhase::Errored), Err(e)) => {
                tracing::warn!(session_id = %id, error = %e, "[AgentBridge] agent failed");
                self.emit_error(id, e.to_string(), None);
            }
            (phase, _) => {
                tracing::debug!(session_id = %id, ?phase, "[AgentBridge] run ended without outcome event");
            }
        }
    }

    fn fail(&self, id: &SessionId, epoch: u64, error: String) {
        let reported = self
            .with_live_session(id, epoch, |state| {
                state.phase.transition(SessionPhase::Errored);
            })
            .is_some();
        self.release(id, epoch);
        if reported {
            self.emit_error(id, error, None);
        }
    }

    fn emit_error(&self, id: &SessionId, error: String, exit_code: Option<i32>) {
        self.error_events.emit(&ErrorEvent {
            session_id: id.clone(),
            error,
            exit_code,
        });
    }

    /// Drops the session entry if it still belongs to this run.
    fn release(&self, id: &SessionId, epoch: u64) {
        self.with_sessions(|sessions| {
            if sessions.get(id).is_some_and(|s| s.epoch == epoch) {
                sessions.remove(id);
            }
        });
    }

    fn is_live(&self, id: &SessionId, epoch: u64) -> bool {
        self.with_live_session(id, epoch, |_| ()).is_some()
    }

    fn with_live_session<T>(
        &self,
        id: &SessionId,
        epoch: u64,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Option<T> {
        self.with_sessions(|sessions| {
            sessions
                .get_mut(id)
                .filter(|s| s.active && s.epoch == epoch)
                .map(f)
        })
        .flatten()
    }

    fn with_sessions<T>(&self, f: impl FnOnce(&mut HashMap<SessionId, SessionState>) -> T) -> Option<T> {
        self.sessions.lock().ok().map(|mut guard| f(&mut guard))
    }
}

/// Command-line arguments for one non-interactive agent run.
pub fn build_args(options: &QueryOptions) -> Vec<String> {
    let mut args: Vec<String> = ["--print", "--verbose", "--output-format", "stream-json"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(system_prompt) = &options.system_prompt {
        args.push("--system-prompt".to_string());
        args.push(system_prompt.clone());
    }
    if !options.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(options.allowed_tools.join(","));
    }
    args.push(options.prompt.clone());
    args
}
