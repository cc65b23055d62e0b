//! Agent-facing domain types.

pub mod message;
pub mod permission;
pub mod session;

pub use message::{AgentMessage, MessageRole, ToolInvocation, ToolStatus};
pub use permission::{PermissionDecision, PermissionRequest};
pub use session::{
    CompleteEvent, ErrorEvent, QueryOptions, SessionId, SessionPhase, SessionSnapshot,
    StreamEvent,
};
