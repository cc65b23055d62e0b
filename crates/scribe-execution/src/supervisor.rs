//! Process supervisor.
//!
//! Spawns external commands, tracks them in a registry, and enforces an
//! advisory concurrency ceiling. A registry entry is inserted before the
//! spawn attempt and removed exactly once, when the process reaches a
//! terminal state (exit, kill, timeout) or the spawn itself fails.
//!
//! Callers that must not oversubscribe check [`ProcessSupervisor::can_accept`]
//! before spawning. The supervisor itself never blocks or queues.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use scribe_core::config::ProxyConfig;
use scribe_core::process::{
    ManagedProcessInfo, OutputChunk, OutputStream, ProcessExit, ProcessId, ProcessStatus,
    RunOptions, RunOutcome,
};
use scribe_core::{Result, ScribeError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_CONCURRENT: usize = 3;
/// Exit code reported when a run hits its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal
const READ_CHUNK_SIZE: usize = 8192;
/// How long a process gets between SIGTERM and a hard kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

struct Entry {
    info: ManagedProcessInfo,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<ProcessId, Entry>>>;

/// Spawns, tracks and terminates child processes.
pub struct ProcessSupervisor {
    registry: Registry,
    next_id: AtomicU64,
    max_concurrent: usize,
    proxy: RwLock<ProxyConfig>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_max_concurrent(DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            max_concurrent,
            proxy: RwLock::new(ProxyConfig::default()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Replaces the proxy used for runs that set `use_proxy`.
    pub fn set_proxy(&self, proxy: ProxyConfig) {
        if let Ok(mut guard) = self.proxy.write() {
            *guard = proxy;
        }
    }

    /// Spawns `command` and returns a handle to its output and exit.
    ///
    /// Fails only when the OS refuses the spawn; a non-zero exit is reported
    /// through [`SpawnedProcess::wait`] as a normal outcome.
    pub fn spawn(&self, command: &str, args: &[String], options: RunOptions) -> Result<SpawnedProcess> {
        let id = ProcessId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();

        // Visible to can_accept() from here on.
        self.with_registry(|registry| {
            registry.insert(
                id,
                Entry {
                    info: ManagedProcessInfo {
                        id,
                        command: command.to_string(),
                        args: args.to_vec(),
                        pid: None,
                        status: ProcessStatus::Running,
                        started_at: Utc::now(),
                        exit_code: None,
                    },
                    cancel: cancel.clone(),
                },
            );
        });

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if options.use_proxy {
            cmd.envs(self.proxy_env());
        }
        cmd.envs(&options.env);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.with_registry(|registry| {
                    registry.remove(&id);
                });
                tracing::warn!(process_id = %id, command, error = %e, "[Supervisor] spawn failed");
                return Err(ScribeError::spawn(command, &e));
            }
        };

        let pid = child.id();
        self.with_registry(|registry| {
            if let Some(entry) = registry.get_mut(&id) {
                entry.info.pid = pid;
            }
        });
        tracing::debug!(process_id = %id, ?pid, command, "[Supervisor] spawned");

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_output(stdout, OutputStream::Stdout, chunk_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_output(stderr, OutputStream::Stderr, chunk_tx)));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(supervise(id, child, readers, cancel, options.timeout, registry, exit_tx));

        Ok(SpawnedProcess {
            id,
            pid,
            output: chunk_rx,
            exit: exit_rx,
        })
    }

    /// Runs a command to completion, buffering stdout and stderr.
    pub async fn run(&self, command: &str, args: &[String], options: RunOptions) -> Result<RunOutcome> {
        self.run_streaming(command, args, options, |_| {}).await
    }

    /// Runs a command to completion, handing each chunk to `on_chunk` as it
    /// arrives. Output is still accumulated into the returned outcome.
    pub async fn run_streaming<F>(
        &self,
        command: &str,
        args: &[String],
        options: RunOptions,
        mut on_chunk: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(&OutputChunk),
    {
        let mut process = self.spawn(command, args, options)?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = process.next_chunk().await {
            on_chunk(&chunk);
            match chunk.stream {
                OutputStream::Stdout => stdout.extend_from_slice(&chunk.bytes),
                OutputStream::Stderr => stderr.extend_from_slice(&chunk.bytes),
            }
        }
        let exit = process.wait().await?;
        Ok(RunOutcome {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: exit.exit_code,
            timed_out: exit.timed_out,
        })
    }

    /// Signals a tracked process to terminate.
    ///
    /// Returns `false` for unknown ids and for processes that were already
    /// signalled; never fails.
    pub fn kill(&self, id: ProcessId) -> bool {
        self.with_registry(|registry| match registry.get_mut(&id) {
            Some(entry) if entry.info.status == ProcessStatus::Running => {
                entry.info.status = ProcessStatus::Killed;
                entry.cancel.cancel();
                tracing::info!(process_id = %id, "[Supervisor] kill requested");
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// Signals every tracked process without waiting for them to exit.
    pub fn kill_all(&self) -> usize {
        let ids: Vec<ProcessId> = self
            .with_registry(|registry| registry.keys().copied().collect())
            .unwrap_or_default();
        ids.into_iter().filter(|id| self.kill(*id)).count()
    }

    pub fn list(&self) -> Vec<ManagedProcessInfo> {
        let mut infos: Vec<ManagedProcessInfo> = self
            .with_registry(|registry| registry.values().map(|e| e.info.clone()).collect())
            .unwrap_or_default();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn active_count(&self) -> usize {
        self.with_registry(|registry| registry.len()).unwrap_or(0)
    }

    /// True iff the number of tracked processes is below the ceiling.
    pub fn can_accept(&self) -> bool {
        self.active_count() < self.max_concurrent
    }

    fn proxy_env(&self) -> Vec<(String, String)> {
        self.proxy.read().map(|p| p.env()).unwrap_or_default()
    }

    fn with_registry<T>(&self, f: impl FnOnce(&mut HashMap<ProcessId, Entry>) -> T) -> Option<T> {
        self.registry.lock().ok().map(|mut guard| f(&mut guard))
    }
}

/// A running child owned by the supervisor.
///
/// Drain [`next_chunk`](Self::next_chunk) until it returns `None`, then
/// [`wait`](Self::wait) for the exit.
pub struct SpawnedProcess {
    pub id: ProcessId,
    pub pid: Option<u32>,
    output: mpsc::UnboundedReceiver<OutputChunk>,
    exit: oneshot::Receiver<ProcessExit>,
}

impl SpawnedProcess {
    /// Next output chunk, or `None` once both streams reached EOF.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.output.recv().await
    }

    /// Resolves after the registry entry has been removed.
    pub async fn wait(self) -> Result<ProcessExit> {
        self.exit
            .await
            .map_err(|_| ScribeError::internal(format!("supervisor task for {} dropped", self.id)))
    }
}

async fn forward_output<R>(mut reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                // Keep draining even if nobody listens so the child never blocks on a full pipe.
                let _ = tx.send(OutputChunk {
                    stream,
                    bytes: buf[..n].to_vec(),
                });
            }
            Err(e) => {
                tracing::debug!(?stream, error = %e, "[Supervisor] read error, closing stream");
                break;
            }
        }
    }
}

async fn supervise(
    id: ProcessId,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    registry: Registry,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let deadline = async {
        match timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending::<()>().await,
        }
    };

    let (status, timed_out, killed) = tokio::select! {
        status = child.wait() => (status, false, false),
        _ = deadline => {
            tracing::warn!(process_id = %id, ?timeout, "[Supervisor] timed out");
            (terminate(&mut child).await, true, false)
        }
        _ = cancel.cancelled() => (terminate(&mut child).await, false, true),
    };

    for reader in readers {
        let _ = reader.await;
    }

    let exit_code = match (&status, timed_out) {
        (_, true) => TIMEOUT_EXIT_CODE,
        (Ok(status), false) => exit_code_of(status),
        (Err(_), false) => -1,
    };
    let final_status = if killed {
        ProcessStatus::Killed
    } else if exit_code == 0 {
        ProcessStatus::Completed
    } else {
        ProcessStatus::Error
    };

    if let Ok(mut guard) = registry.lock() {
        guard.remove(&id);
    }
    if let Err(e) = &status {
        tracing::warn!(process_id = %id, error = %e, "[Supervisor] wait failed");
    }
    tracing::debug!(process_id = %id, exit_code, status = ?final_status, "[Supervisor] exited");

    let _ = exit_tx.send(ProcessExit {
        exit_code,
        timed_out,
        killed,
    });
}

/// SIGTERM first, hard kill if the process outlives the grace period.
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    send_term(child);
    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            child.start_kill()?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_term(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "[Supervisor] SIGTERM failed");
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn send_term(child: &mut Child) {
    let _ = child.start_kill();
}

fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let supervisor = ProcessSupervisor::new();
        let outcome = supervisor
            .run("sh", &args(&["-c", "echo out; echo err 1>&2; exit 3"]), RunOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error_and_leaves_registry_empty() {
        let supervisor = ProcessSupervisor::new();
        let err = supervisor
            .run("definitely-not-a-real-binary-xyz", &[], RunOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_spawn());
        assert!(err.hint().is_some());
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_env_overrides_and_proxy() {
        let supervisor = ProcessSupervisor::new();
        supervisor.set_proxy(ProxyConfig {
            address: "10.1.1.1:3128".into(),
            enabled: true,
        });
        let options = RunOptions::new().env("SCRIBE_TEST_VAR", "hello").use_proxy(true);
        let outcome = supervisor
            .run("sh", &args(&["-c", "echo $SCRIBE_TEST_VAR $HTTPS_PROXY"]), options)
            .await
            .unwrap();

        assert_eq!(outcome.stdout.trim(), "hello http://10.1.1.1:3128");
    }

    #[tokio::test]
    async fn test_cwd_is_applied() {
        let supervisor = ProcessSupervisor::new();
        let outcome = supervisor
            .run("pwd", &[], RunOptions::new().cwd("/"))
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "/");
    }

    #[tokio::test]
    async fn test_streaming_delivers_chunks_in_order() {
        let supervisor = ProcessSupervisor::new();
        let mut seen = Vec::new();
        let outcome = supervisor
            .run_streaming(
                "sh",
                &args(&["-c", "printf a; sleep 0.05; printf b; sleep 0.05; printf c"]),
                RunOptions::new(),
                |chunk| seen.extend_from_slice(&chunk.bytes),
            )
            .await
            .unwrap();

        assert_eq!(seen, b"abc");
        assert_eq!(outcome.stdout, "abc");
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_timeout_reports_conventional_code() {
        let supervisor = ProcessSupervisor::new();
        let outcome = supervisor
            .run(
                "sleep",
                &args(&["5"]),
                RunOptions::new().timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_tracks_until_terminal_and_ceiling() {
        let supervisor = ProcessSupervisor::with_max_concurrent(2);
        let a = supervisor.spawn("sleep", &args(&["5"]), RunOptions::new()).unwrap();
        assert!(supervisor.can_accept());
        let b = supervisor.spawn("sleep", &args(&["5"]), RunOptions::new()).unwrap();

        assert_eq!(supervisor.active_count(), 2);
        assert!(!supervisor.can_accept());
        assert!(supervisor.list().iter().all(|p| p.pid.is_some()));

        assert!(supervisor.kill(a.id));
        let exit = a.wait().await.unwrap();
        assert!(exit.killed);
        assert_eq!(supervisor.active_count(), 1);
        assert!(supervisor.can_accept());

        assert_eq!(supervisor.kill_all(), 1);
        b.wait().await.unwrap();
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let supervisor = ProcessSupervisor::new();
        let p = supervisor.spawn("sleep", &args(&["5"]), RunOptions::new()).unwrap();
        let id = p.id;

        assert!(supervisor.kill(id));
        assert!(!supervisor.kill(id));
        p.wait().await.unwrap();
        assert!(!supervisor.kill(id));
        assert!(!supervisor.kill(ProcessId(9999)));
    }

    #[tokio::test]
    async fn test_killed_exit_code_reflects_signal() {
        let supervisor = ProcessSupervisor::new();
        let p = supervisor.spawn("sleep", &args(&["5"]), RunOptions::new()).unwrap();
        supervisor.kill(p.id);
        let exit = p.wait().await.unwrap();
        assert_eq!(exit.exit_code, EXIT_CODE_SIGNAL_BASE + 15);
        assert!(!exit.success());
    }
}
