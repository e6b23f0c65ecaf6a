use super::{Frame, FrameStream, PushConnector};
use crate::error::{ClientError, Result};
use crate::session::WorkspaceId;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Opens `/api/workspaces/{id}/ws` on the notebook server.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: Url,
}

impl WsConnector {
    pub fn new(base_url: Url) -> Result<Self> {
        let mut base_url = base_url;
        let scheme = match base_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        base_url
            .set_scheme(scheme)
            .map_err(|()| ClientError::UnsupportedScheme(scheme.to_string()))?;
        Ok(Self { base_url })
    }

    pub fn workspace_url(&self, workspace: &WorkspaceId) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ClientError::UnsupportedScheme(self.base_url.scheme().to_string()))?;
            path.pop_if_empty()
                .extend(["api", "workspaces", workspace.as_str(), "ws"]);
        }
        Ok(url)
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, workspace: &WorkspaceId) -> Result<FrameStream> {
        let url = self.workspace_url(workspace)?;
        tracing::debug!(%url, "connecting push channel");
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;

        let frames = stream.map(|message| match message {
            Ok(Message::Text(text)) => Ok(Frame::Text(text)),
            Ok(Message::Close(_)) => Ok(Frame::Close),
            Ok(_) => Ok(Frame::Other),
            Err(err) => Err(ClientError::from(err)),
        });
        Ok(Box::pin(frames))
    }
}
