//! Permission prompt types.
//!
//! The agent currently runs non-interactively, so requests are never raised
//! by the bridge. The types exist so front-ends can already bind to them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::SessionId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    pub session_id: SessionId,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    Deny,
    AllowAlways,
}
