//! Locates the agent executable.
//!
//! GUI apps launched outside a terminal often inherit a minimal PATH, so a
//! bare `claude` lookup can miss an install that works fine in the user's
//! shell. Resolution runs three tiers, first hit wins:
//!
//! 1. Search well-known install directories and nvm node versions (newest first).
//! 2. Ask `which`/`where` with those directories prepended to PATH (5s limit).
//! 3. Fall back to the bare name and let the spawn report the real error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use semver::Version;
use tokio::process::Command;

pub const AGENT_BINARY: &str = "claude";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Override,
    KnownDir,
    Lookup,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    pub path: PathBuf,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone)]
pub struct BinaryResolver {
    binary: String,
    home: Option<PathBuf>,
    override_path: Option<PathBuf>,
    base_path: Option<OsString>,
}

impl Default for BinaryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryResolver {
    pub fn new() -> Self {
        Self::for_binary(AGENT_BINARY)
    }

    pub fn for_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            home: dirs::home_dir(),
            override_path: None,
            base_path: std::env::var_os("PATH"),
        }
    }

    /// Uses `path` as-is and skips discovery.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Replaces the inherited PATH that the extended PATH is built on.
    pub fn with_base_path(mut self, path: impl Into<OsString>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn binary_name(&self) -> &str {
        &self.binary
    }

    /// Directories searched in tier 1, in priority order.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin", "/bin"]
            .iter()
            .map(PathBuf::from)
            .collect();

        if let Some(home) = &self.home {
            dirs.extend(
                [
                    ".claude/local",
                    ".local/bin",
                    ".npm-global/bin",
                    ".volta/bin",
                    ".bun/bin",
                    "bin",
                ]
                .iter()
                .map(|rel| home.join(rel)),
            );
            dirs.extend(nvm_bin_dirs(home));
        }
        dirs
    }

    /// PATH with the candidate directories prepended to the inherited one.
    pub fn extended_path(&self) -> OsString {
        let mut entries = self.candidate_dirs();
        if let Some(base) = &self.base_path {
            for existing in std::env::split_paths(base) {
                if !existing.as_os_str().is_empty() && !entries.contains(&existing) {
                    entries.push(existing);
                }
            }
        }
        std::env::join_paths(entries).unwrap_or_else(|_| self.base_path.clone().unwrap_or_default())
    }

    /// Tier 1 only; no subprocesses.
    pub fn search_known_dirs(&self) -> Option<PathBuf> {
        self.candidate_dirs()
            .into_iter()
            .map(|dir| dir.join(&self.binary))
            .find(|candidate| is_executable(candidate))
    }

    /// Tier 2: shell lookup with the extended PATH.
    pub async fn lookup(&self) -> Option<PathBuf> {
        let finder = if cfg!(windows) { "where" } else { "which" };
        let mut cmd = Command::new(finder);
        cmd.arg(&self.binary)
            .env("PATH", self.extended_path())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(LOOKUP_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(_)) => return None,
            Ok(Err(e)) => {
                tracing::debug!(finder, error = %e, "[Resolver] lookup command failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(finder, "[Resolver] lookup timed out");
                return None;
            }
        };

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
    }

    /// Runs all tiers. Never fails.
    pub async fn resolve(&self) -> ResolvedBinary {
        let resolved = if let Some(path) = &self.override_path {
            ResolvedBinary {
                path: path.clone(),
                source: ResolutionSource::Override,
            }
        } else if let Some(path) = self.search_known_dirs() {
            ResolvedBinary {
                path,
                source: ResolutionSource::KnownDir,
            }
        } else if let Some(path) = self.lookup().await {
            ResolvedBinary {
                path,
                source: ResolutionSource::Lookup,
            }
        } else {
            ResolvedBinary {
                path: PathBuf::from(&self.binary),
                source: ResolutionSource::Fallback,
            }
        };
        tracing::info!(path = %resolved.path.display(), source = ?resolved.source, "[Resolver] agent binary");
        resolved
    }
}

/// `~/.nvm/versions/node/*/bin`, highest version first.
fn nvm_bin_dirs(home: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(home.join(".nvm/versions/node")) else {
        return Vec::new();
    };

    let mut versions: Vec<(Option<Version>, PathBuf)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let parsed = Version::parse(name.trim_start_matches('v')).ok();
            (parsed, e.path().join("bin"))
        })
        .collect();

    // Unparseable names sort after every real version, then by path.
    versions.sort_by(|(va, pa), (vb, pb)| match (va, vb) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => pb.cmp(pa),
    });
    versions.into_iter().map(|(_, bin)| bin).collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
