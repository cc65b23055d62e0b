//! Normalized agent message types.
//!
//! Every structured record or plain-text line the agent prints is reduced to
//! zero or one [`AgentMessage`]. Once a message has been handed to
//! subscribers it is never mutated; later deltas arrive as new messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the agent.
    Assistant,
    /// Diagnostics, stderr output and error records.
    System,
}

/// Lifecycle of a single tool invocation.
///
/// Variants are declared in lifecycle order; `Completed` and `Error` are
/// both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }

    /// Returns the status after attempting to move to `next`.
    ///
    /// Transitions never go backwards and never leave a terminal status.
    pub fn advance(self, next: ToolStatus) -> ToolStatus {
        if self.is_terminal() || next <= self {
            self
        } else {
            next
        }
    }
}

/// A tool call attached to an agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    /// Arbitrary key-value input, as the agent reported it.
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub status: ToolStatus,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            output: None,
            status: ToolStatus::Pending,
        }
    }

    pub fn advance(&mut self, next: ToolStatus) {
        self.status = self.status.advance(next);
    }
}

/// A single normalized unit of agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl AgentMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            is_streaming: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn streaming(mut self) -> Self {
        self.is_streaming = true;
        self
    }

    pub fn with_tool(mut self, tool: ToolInvocation) -> Self {
        self.tool_calls.push(tool);
        self
    }
}
