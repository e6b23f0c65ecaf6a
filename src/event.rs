use crate::error::ClientError;
use crate::session::{Artifact, ChatMessage, SourceRef, WorkspaceId};
use crate::sync::PushNotification;

/// Everything that reaches the store from outside the caller's own task.
#[derive(Debug)]
pub enum AppEvent {
    Push(PushNotification),
    Settled {
        workspace_id: WorkspaceId,
        /// Epoch of the `open` the call was issued under.
        session: u64,
        outcome: Settlement,
    },
}

/// A transcript fetch, numbered when the request left the client.
#[derive(Debug)]
pub struct TranscriptRead {
    pub seq: u64,
    pub messages: Vec<ChatMessage>,
}

/// Result of one spawned backend call, tagged with what it was for.
#[derive(Debug)]
pub enum Settlement {
    Transcript(Result<TranscriptRead, ClientError>),
    /// Chat send followed by a transcript refetch.
    Sent(Result<TranscriptRead, ClientError>),
    Reset(Result<(), ClientError>),
    /// Undo-reset followed by a transcript refetch.
    Restored(Result<TranscriptRead, ClientError>),
    Sources(Result<Vec<SourceRef>, ClientError>),
    Artifacts(Result<Vec<Artifact>, ClientError>),
    /// Artifact create/update/delete followed by an artifact refetch.
    ArtifactsEdited(Result<Vec<Artifact>, ClientError>),
    Suggestions(Result<Vec<String>, ClientError>),
}

impl Settlement {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transcript(_) => "transcript",
            Self::Sent(_) => "send",
            Self::Reset(_) => "reset",
            Self::Restored(_) => "restore",
            Self::Sources(_) => "sources",
            Self::Artifacts(_) => "artifacts",
            Self::ArtifactsEdited(_) => "artifact_edit",
            Self::Suggestions(_) => "suggestions",
        }
    }
}
