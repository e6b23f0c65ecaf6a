use super::{ArtifactDraft, NotebookBackend, SendRequest};
use crate::error::{ClientError, Result};
use crate::session::{
    Artifact, ArtifactId, ChatMessage, ChatMessageWire, SourceRef, WorkspaceId,
    WorkspaceSummary,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct NewWorkspace<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WorkspaceRename<'a> {
    name: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme(base_url.scheme().to_string()));
        }
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ClientError::UnsupportedScheme(self.base_url.scheme().to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn workspace_endpoint(&self, workspace: &WorkspaceId, segments: &[&str]) -> Result<Url> {
        let mut all = vec!["api", "workspaces", workspace.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(%url, "GET");
        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn post_empty(&self, url: Url) -> Result<()> {
        tracing::debug!(%url, "POST");
        check_status(self.client.post(url).send().await?).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl NotebookBackend for HttpBackend {
    async fn fetch_transcript(&self, workspace: &WorkspaceId) -> Result<Vec<ChatMessage>> {
        let url = self.workspace_endpoint(workspace, &["chat"])?;
        let rows: Vec<ChatMessageWire> = self.get_json(url).await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn send_message(
        &self,
        workspace: &WorkspaceId,
        request: &SendRequest,
    ) -> Result<ChatMessage> {
        let url = self.workspace_endpoint(workspace, &["chat"])?;
        tracing::debug!(%url, filtered = request.source_ids.is_some(), "POST chat message");
        let response = check_status(self.client.post(url).json(request).send().await?).await?;
        let reply: ChatMessageWire = response.json().await?;
        Ok(reply.into())
    }

    async fn reset_chat(&self, workspace: &WorkspaceId) -> Result<()> {
        self.post_empty(self.workspace_endpoint(workspace, &["chat", "reset"])?)
            .await
    }

    async fn undo_reset(&self, workspace: &WorkspaceId) -> Result<()> {
        self.post_empty(self.workspace_endpoint(workspace, &["chat", "undo-reset"])?)
            .await
    }

    async fn fetch_suggestions(&self, workspace: &WorkspaceId) -> Result<Vec<String>> {
        self.get_json(self.workspace_endpoint(workspace, &["chat", "suggestions"])?)
            .await
    }

    async fn fetch_follow_ups(&self, workspace: &WorkspaceId) -> Result<Vec<String>> {
        self.get_json(self.workspace_endpoint(workspace, &["chat", "follow-ups"])?)
            .await
    }

    async fn fetch_sources(&self, workspace: &WorkspaceId) -> Result<Vec<SourceRef>> {
        self.get_json(self.workspace_endpoint(workspace, &["sources"])?)
            .await
    }

    async fn fetch_artifacts(&self, workspace: &WorkspaceId) -> Result<Vec<Artifact>> {
        self.get_json(self.workspace_endpoint(workspace, &["artifacts"])?)
            .await
    }

    async fn create_artifact(
        &self,
        workspace: &WorkspaceId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact> {
        let url = self.workspace_endpoint(workspace, &["artifacts"])?;
        let response = check_status(self.client.post(url).json(draft).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn update_artifact(
        &self,
        workspace: &WorkspaceId,
        id: ArtifactId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact> {
        let id = id.to_string();
        let url = self.workspace_endpoint(workspace, &["artifacts", id.as_str()])?;
        let response = check_status(self.client.put(url).json(draft).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete_artifact(&self, workspace: &WorkspaceId, id: ArtifactId) -> Result<()> {
        let id = id.to_string();
        let url = self.workspace_endpoint(workspace, &["artifacts", id.as_str()])?;
        check_status(self.client.delete(url).send().await?).await?;
        Ok(())
    }

    async fn list_workspaces(&self, team_id: Option<&str>) -> Result<Vec<WorkspaceSummary>> {
        let mut url = self.endpoint(&["api", "workspaces"])?;
        if let Some(team_id) = team_id {
            url.query_pairs_mut().append_pair("team_id", team_id);
        }
        self.get_json(url).await
    }

    async fn create_workspace(
        &self,
        name: &str,
        team_id: Option<&str>,
    ) -> Result<WorkspaceSummary> {
        let url = self.endpoint(&["api", "workspaces"])?;
        tracing::debug!(%url, name, "POST workspace");
        let body = NewWorkspace { name, team_id };
        let response = check_status(self.client.post(url).json(&body).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn rename_workspace(
        &self,
        workspace: &WorkspaceId,
        name: &str,
    ) -> Result<WorkspaceSummary> {
        let url = self.workspace_endpoint(workspace, &[])?;
        let body = WorkspaceRename { name };
        let response = check_status(self.client.patch(url).json(&body).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete_workspace(&self, workspace: &WorkspaceId) -> Result<()> {
        let url = self.workspace_endpoint(workspace, &[])?;
        tracing::debug!(%url, "DELETE workspace");
        check_status(self.client.delete(url).send().await?).await?;
        Ok(())
    }
}
