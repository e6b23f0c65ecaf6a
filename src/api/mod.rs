use crate::error::Result;
use crate::session::{
    Artifact, ArtifactId, ChatMessage, SourceId, SourceRef, WorkspaceId, WorkspaceSummary,
};
use async_trait::async_trait;
use serde::Serialize;

mod http;

pub use http::HttpBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ids: Option<Vec<SourceId>>,
}

impl SendRequest {
    /// An empty filter means "all sources", so it is left off the request.
    pub fn new(content: impl Into<String>, enabled: &[SourceId]) -> Self {
        Self {
            content: content.into(),
            source_ids: (!enabled.is_empty()).then(|| enabled.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDraft {
    pub title: String,
    pub content_markdown: String,
}

/// Request/response calls the notebook server answers. Every call is scoped
/// to one workspace.
#[async_trait]
pub trait NotebookBackend: Send + Sync {
    async fn fetch_transcript(&self, workspace: &WorkspaceId) -> Result<Vec<ChatMessage>>;

    /// The returned message is advisory; callers refetch the transcript.
    async fn send_message(&self, workspace: &WorkspaceId, request: &SendRequest)
        -> Result<ChatMessage>;

    async fn reset_chat(&self, workspace: &WorkspaceId) -> Result<()>;
    async fn undo_reset(&self, workspace: &WorkspaceId) -> Result<()>;

    async fn fetch_suggestions(&self, workspace: &WorkspaceId) -> Result<Vec<String>>;
    async fn fetch_follow_ups(&self, workspace: &WorkspaceId) -> Result<Vec<String>>;

    async fn fetch_sources(&self, workspace: &WorkspaceId) -> Result<Vec<SourceRef>>;

    async fn fetch_artifacts(&self, workspace: &WorkspaceId) -> Result<Vec<Artifact>>;
    async fn create_artifact(&self, workspace: &WorkspaceId, draft: &ArtifactDraft)
        -> Result<Artifact>;
    async fn update_artifact(
        &self,
        workspace: &WorkspaceId,
        id: ArtifactId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact>;
    async fn delete_artifact(&self, workspace: &WorkspaceId, id: ArtifactId) -> Result<()>;

    async fn list_workspaces(&self, team_id: Option<&str>) -> Result<Vec<WorkspaceSummary>>;
    async fn create_workspace(&self, name: &str, team_id: Option<&str>)
        -> Result<WorkspaceSummary>;
    async fn rename_workspace(&self, workspace: &WorkspaceId, name: &str)
        -> Result<WorkspaceSummary>;
    /// Removes the workspace with its sources, transcript and artifacts.
    async fn delete_workspace(&self, workspace: &WorkspaceId) -> Result<()>;
}
