//! Agent session identity, lifecycle phase and the events a session emits.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::message::AgentMessage;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session lifecycle: `Created -> Running -> {Completed | Errored | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    Running,
    Completed,
    Errored,
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Errored | SessionPhase::Cancelled
        )
    }

    /// Attempts a transition. Returns `false` and leaves `self` untouched when
    /// the move is not allowed.
    pub fn transition(&mut self, next: SessionPhase) -> bool {
        let allowed = match (*self, next) {
            (SessionPhase::Created, SessionPhase::Running) => true,
            (SessionPhase::Created | SessionPhase::Running, n) if n.is_terminal() => true,
            _ => false,
        };
        if allowed {
            *self = next;
        }
        allowed
    }
}

/// Options for a single agent query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<std::path::PathBuf>,
    /// Continue an existing session instead of starting a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl QueryOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<std::path::PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// A streamed message tagged with its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub session_id: SessionId,
    pub message: AgentMessage,
}

/// Terminal success payload: all assistant content, joined by newlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEvent {
    pub session_id: SessionId,
    pub result: String,
}

/// Terminal failure payload for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub session_id: SessionId,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub phase: SessionPhase,
    pub active: bool,
    pub messages: Vec<AgentMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_prefixed() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("session_"));
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn test_phase_happy_path() {
        let mut phase = SessionPhase::Created;
        assert!(phase.transition(SessionPhase::Running));
        assert!(phase.transition(SessionPhase::Completed));
        assert_eq!(phase, SessionPhase::Completed);
    }

    #[test]
    fn test_no_transition_out_of_terminal_phase() {
        let mut phase = SessionPhase::Cancelled;
        assert!(!phase.transition(SessionPhase::Running));
        assert!(!phase.transition(SessionPhase::Completed));
        assert_eq!(phase, SessionPhase::Cancelled);
    }

    #[test]
    fn test_running_cannot_go_back_to_created() {
        let mut phase = SessionPhase::Running;
        assert!(!phase.transition(SessionPhase::Created));
        assert!(phase.transition(SessionPhase::Errored));
    }

    #[test]
    fn test_query_options_builder() {
        let opts = QueryOptions::new("hello")
            .with_system_prompt("be brief")
            .with_allowed_tools(["Read", "Write"])
            .with_session_id("s1");
        assert_eq!(opts.allowed_tools, vec!["Read", "Write"]);
        assert_eq!(opts.session_id, Some(SessionId::from("s1")));
    }
}
