//! Error types for the Scribe backend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hint attached to spawn failures when the agent executable cannot be found.
pub const AGENT_INSTALL_HINT: &str = "Make sure the 'claude' CLI is installed and reachable on PATH \
     (npm install -g @anthropic-ai/claude-code)";

/// Error returned by every fallible Scribe operation.
///
/// Failures that are local to one unit of work (a stream line, a scan target,
/// a tier read) are absorbed where they happen and never become a `ScribeError`.
/// Everything that reaches this type failed a whole operation.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ScribeError {
    #[error("{entity_type} not found: '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Filesystem failure, with the OS error kind folded into the message.
    #[error("I/O failed: {message}")]
    Io { message: String },

    /// The OS refused to start a child process.
    #[error("Failed to spawn '{program}': {message}{}", hint_suffix(.hint))]
    Spawn {
        program: String,
        message: String,
        hint: Option<String>,
    },

    /// `format` names the encoding ("JSON", "TOML").
    #[error("{format} encoding failed: {message}")]
    Serialization { format: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A process or agent session did not finish successfully.
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("File watching failed: {0}")]
    Watch(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A broken internal invariant, e.g. a dropped supervisor task.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Wraps the OS error of a failed spawn.
    ///
    /// A `NotFound` kind carries [`AGENT_INSTALL_HINT`] so the user sees what
    /// to install rather than a bare `ENOENT`.
    pub fn spawn(program: impl Into<String>, err: &std::io::Error) -> Self {
        let hint = (err.kind() == std::io::ErrorKind::NotFound)
            .then(|| AGENT_INSTALL_HINT.to_string());
        Self::Spawn {
            program: program.into(),
            message: err.to_string(),
            hint,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Install hint of a spawn failure.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Spawn { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    fn encoding(format: &str, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            format: format.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ScribeError {
    fn from(err: std::io::Error) -> Self {
        Self::io(format!("{err} (kind: {:?})", err.kind()))
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(err: serde_json::Error) -> Self {
        Self::encoding("JSON", err)
    }
}

impl From<toml::de::Error> for ScribeError {
    fn from(err: toml::de::Error) -> Self {
        Self::encoding("TOML", err)
    }
}

impl From<toml::ser::Error> for ScribeError {
    fn from(err: toml::ser::Error) -> Self {
        Self::encoding("TOML", err)
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref().map(|h| format!(". {h}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_spawn_not_found_carries_hint() {
        let err = ScribeError::spawn("claude", &io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_spawn());
        assert_eq!(err.hint(), Some(AGENT_INSTALL_HINT));
        assert!(err.to_string().contains("npm install -g"));
    }

    #[test]
    fn test_spawn_permission_denied_has_no_hint() {
        let err = ScribeError::spawn(
            "/opt/claude",
            &io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.hint().is_none());
        assert!(err.to_string().starts_with("Failed to spawn '/opt/claude'"));
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err: ScribeError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(err.is_io());
        assert!(err.to_string().contains("PermissionDenied"));
    }
}
