use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a workspace. Workspaces are the scoping unit for every
/// cached payload, so the id gets a newtype rather than a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        WorkspaceId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub id: WorkspaceId,
    pub name: String,
    #[serde(rename = "documentCount")]
    pub document_count: u64,
    #[serde(rename = "memberCount")]
    pub member_count: Option<u32>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}
