use serde::{Deserialize, Serialize};
use std::fmt;

pub mod storage;

pub type SourceId = i64;
pub type ArtifactId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Server rows carry the backend's integer id; optimistic and ephemeral rows
/// get a per-store counter so they can never collide with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(i64),
    Local(u64),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub cited_sources: Option<Vec<String>>,
    pub created_at: String,
}

impl ChatMessage {
    pub fn local(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(id),
            role,
            content: content.into(),
            cited_sources: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Transcript row as the backend serializes it. `sources_cited` is a JSON
/// array encoded inside a string column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageWire {
    pub id: i64,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources_cited: Option<String>,
    pub created_at: String,
}

impl From<ChatMessageWire> for ChatMessage {
    fn from(wire: ChatMessageWire) -> Self {
        let cited_sources = wire
            .sources_cited
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok());
        Self {
            id: MessageId::Server(wire.id),
            role: wire.role,
            content: wire.content,
            cited_sources,
            created_at: wire.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub content_markdown: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub id: WorkspaceId,
    pub name: String,
}
