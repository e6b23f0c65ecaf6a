use crate::api::{ArtifactDraft, NotebookBackend, SendRequest};
use crate::command::{self, CommandAction};
use crate::error::{ClientError, Result};
use crate::event::{AppEvent, Settlement, TranscriptRead};
use crate::reconcile::SourceSelection;
use crate::session::storage::{self, StoragePort};
use crate::session::{
    Artifact, ArtifactId, ChatMessage, Role, SourceId, SourceRef, WorkspaceId,
    WorkspaceSummary,
};
use crate::sync::{ChannelState, PushConnector, PushKind, PushNotification, SyncChannel};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const SEND_FAILED_MESSAGE: &str = "Sorry, something went wrong. Please try again.";
pub const RESTORE_FAILED_MESSAGE: &str =
    "Sorry, the previous conversation could not be restored.";
pub const DEFAULT_WORKSPACE_NAME: &str = "Untitled Notebook";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDisposition {
    /// Blank input or no workspace open.
    Ignored,
    /// Handled as a command without sending chat content.
    Local,
    /// Chat content is on its way to the backend.
    Submitted,
}

/// Local view of one open workspace.
///
/// All mutation happens through `&mut self` on the caller's task. Backend
/// calls run on spawned tasks and report back as [`AppEvent`]s, which the
/// caller feeds to [`SessionStateStore::apply_event`] (or lets
/// [`SessionStateStore::settle`] do it). Each call carries the session epoch
/// it was issued under; every `open` and `close` starts a new epoch, so
/// completions from an earlier session are dropped even when the same
/// workspace is opened again. Transcript reads are numbered as they are
/// issued and an older read never replaces a newer one.
pub struct SessionStateStore {
    backend: Arc<dyn NotebookBackend>,
    storage: Box<dyn StoragePort>,
    channel: SyncChannel,
    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
    session: u64,
    transcript_reads: Arc<AtomicU64>,
    applied_transcript_read: u64,
    workspace: Option<WorkspaceId>,
    transcript: Vec<ChatMessage>,
    transcript_revision: u64,
    sources: Vec<SourceRef>,
    artifacts: Vec<Artifact>,
    selection: SourceSelection,
    suggestions: Vec<String>,
    outstanding: usize,
    sends_in_flight: usize,
    next_local_id: u64,
}

impl SessionStateStore {
    pub fn new(
        backend: Arc<dyn NotebookBackend>,
        connector: Arc<dyn PushConnector>,
        storage: Box<dyn StoragePort>,
        reconnect_delay: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = SyncChannel::new(connector, reconnect_delay);
        for kind in [
            PushKind::SourcesChanged,
            PushKind::ChatMessage,
            PushKind::ArtifactsChanged,
        ] {
            let tx = tx.clone();
            channel.register_handler(kind, move |notification| {
                let _ = tx.send(AppEvent::Push(notification.clone()));
            });
        }

        Self {
            backend,
            storage,
            channel,
            tx,
            rx,
            session: 0,
            transcript_reads: Arc::new(AtomicU64::new(0)),
            applied_transcript_read: 0,
            workspace: None,
            transcript: Vec::new(),
            transcript_revision: 0,
            sources: Vec::new(),
            artifacts: Vec::new(),
            selection: SourceSelection::default(),
            suggestions: Vec::new(),
            outstanding: 0,
            sends_in_flight: 0,
            next_local_id: 1,
        }
    }

    pub fn workspace(&self) -> Option<&WorkspaceId> {
        self.workspace.as_ref()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Bumped on every transcript change, including wholesale replacement.
    pub fn transcript_revision(&self) -> u64 {
        self.transcript_revision
    }

    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn enabled_sources(&self) -> &BTreeSet<SourceId> {
        self.selection.enabled()
    }

    pub fn known_sources(&self) -> &BTreeSet<SourceId> {
        self.selection.known()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn is_sending(&self) -> bool {
        self.sends_in_flight > 0
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn storage(&self) -> &dyn StoragePort {
        self.storage.as_ref()
    }

    pub fn recent_workspaces(&self) -> Vec<WorkspaceId> {
        storage::recent_workspaces(self.storage.as_ref())
    }

    pub async fn list_workspaces(&self, team_id: Option<&str>) -> Result<Vec<WorkspaceSummary>> {
        self.backend.list_workspaces(team_id).await
    }

    pub fn open(&mut self, workspace_id: WorkspaceId) {
        tracing::info!(workspace_id = %workspace_id, "opening workspace");
        self.clear_local_state();
        self.workspace = Some(workspace_id.clone());

        if let Err(err) = storage::remember_workspace(self.storage.as_mut(), &workspace_id) {
            tracing::warn!(error = %err, "failed to remember workspace");
        }

        self.channel.open(workspace_id);
        self.refetch_transcript();
        self.refetch_sources();
        self.refetch_artifacts();
    }

    pub fn close(&mut self) {
        self.channel.close();
        if let Some(workspace_id) = self.workspace.take() {
            tracing::info!(workspace_id = %workspace_id, "closed workspace");
        }
        self.clear_local_state();
    }

    /// Opens `preferred` if given, else the most recent workspace the server
    /// still lists, else the first listed one. A team with no workspaces gets
    /// a fresh one.
    pub async fn open_initial(
        &mut self,
        preferred: Option<WorkspaceId>,
        team_id: Option<&str>,
    ) -> Result<WorkspaceId> {
        if let Some(workspace_id) = preferred {
            self.open(workspace_id.clone());
            return Ok(workspace_id);
        }

        let listed = self.backend.list_workspaces(team_id).await?;
        let recent = self
            .recent_workspaces()
            .into_iter()
            .find(|id| listed.iter().any(|summary| &summary.id == id));
        let workspace_id = match recent.or_else(|| listed.first().map(|summary| summary.id.clone())) {
            Some(workspace_id) => workspace_id,
            None => {
                tracing::info!(team_id, "no workspaces yet, creating one");
                self.backend
                    .create_workspace(DEFAULT_WORKSPACE_NAME, team_id)
                    .await?
                    .id
            }
        };
        self.open(workspace_id.clone());
        Ok(workspace_id)
    }

    pub async fn create_workspace(
        &mut self,
        name: &str,
        team_id: Option<&str>,
    ) -> Result<WorkspaceSummary> {
        let created = self.backend.create_workspace(name, team_id).await?;
        self.open(created.id.clone());
        Ok(created)
    }

    pub async fn rename_workspace(&self, name: &str) -> Result<WorkspaceSummary> {
        let workspace_id = self.workspace.as_ref().ok_or(ClientError::NoWorkspace)?;
        self.backend.rename_workspace(workspace_id, name).await
    }

    /// Deletes the open workspace and moves to the first one still listed.
    /// Returns the workspace opened instead, or `None` when none is left.
    pub async fn delete_workspace(&mut self, team_id: Option<&str>) -> Result<Option<WorkspaceId>> {
        let workspace_id = self.workspace.clone().ok_or(ClientError::NoWorkspace)?;
        self.backend.delete_workspace(&workspace_id).await?;
        tracing::info!(workspace_id = %workspace_id, "deleted workspace");
        if let Err(err) = storage::forget_workspace(self.storage.as_mut(), &workspace_id) {
            tracing::warn!(error = %err, "failed to forget deleted workspace");
        }

        let remaining = self.backend.list_workspaces(team_id).await?;
        match remaining.into_iter().find(|summary| summary.id != workspace_id) {
            Some(next) => {
                self.open(next.id.clone());
                Ok(Some(next.id))
            }
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    fn clear_local_state(&mut self) {
        self.session += 1;
        self.transcript.clear();
        self.transcript_revision += 1;
        self.sources.clear();
        self.artifacts.clear();
        self.selection.clear();
        self.suggestions.clear();
        self.sends_in_flight = 0;
    }

    pub fn send_with_selection(&mut self, raw: &str) -> SendDisposition {
        let enabled = self.selection.enabled().clone();
        self.send(raw, &enabled)
    }

    pub fn send(&mut self, raw: &str, enabled: &BTreeSet<SourceId>) -> SendDisposition {
        let text = raw.trim();
        if text.is_empty() {
            return SendDisposition::Ignored;
        }
        if self.workspace.is_none() {
            tracing::warn!("send ignored: no workspace open");
            return SendDisposition::Ignored;
        }

        match command::interpret(&command::parse(text)) {
            CommandAction::ResetTranscript => {
                self.transcript.clear();
                self.transcript_revision += 1;
                self.suggestions.clear();
                self.spawn_call(|backend, workspace| async move {
                    Settlement::Reset(backend.reset_chat(&workspace).await)
                });
                SendDisposition::Local
            }
            CommandAction::RestoreTranscript => {
                let reads = Arc::clone(&self.transcript_reads);
                self.spawn_call(|backend, workspace| async move {
                    let restored = match backend.undo_reset(&workspace).await {
                        Ok(()) => read_transcript(backend.as_ref(), &workspace, &reads).await,
                        Err(err) => Err(err),
                    };
                    Settlement::Restored(restored)
                });
                SendDisposition::Local
            }
            CommandAction::LocalReply(reply) => {
                self.push_local(Role::Assistant, reply);
                SendDisposition::Local
            }
            CommandAction::Submit { display, outgoing } => {
                self.push_local(Role::User, display);
                self.sends_in_flight += 1;

                let filter: Vec<SourceId> = enabled.iter().copied().collect();
                let request = SendRequest::new(outgoing, &filter);
                let reads = Arc::clone(&self.transcript_reads);
                self.spawn_call(move |backend, workspace| async move {
                    let transcript = match backend.send_message(&workspace, &request).await {
                        Ok(_advisory) => read_transcript(backend.as_ref(), &workspace, &reads).await,
                        Err(err) => Err(err),
                    };
                    Settlement::Sent(transcript)
                });
                SendDisposition::Submitted
            }
        }
    }

    pub fn toggle_source(&mut self, id: SourceId) {
        if !self.selection.toggle(id) {
            tracing::debug!(source_id = id, "toggle ignored for unknown source");
        }
    }

    pub fn set_all_sources(&mut self, ids: &[SourceId]) {
        self.selection.set_all(ids);
    }

    pub fn on_sources_refetched(&mut self, ids: &[SourceId]) {
        self.selection.reconcile(ids);
    }

    pub fn on_push(&mut self, notification: &PushNotification) {
        if self.workspace.as_ref() != Some(&notification.workspace_id) {
            tracing::debug!(
                workspace_id = %notification.workspace_id,
                push_type = notification.kind.as_str(),
                "ignoring push for inactive workspace"
            );
            return;
        }
        tracing::debug!(push_type = notification.kind.as_str(), "push received");
        match notification.kind {
            PushKind::SourcesChanged => self.refetch_sources(),
            PushKind::ChatMessage => self.refetch_transcript(),
            PushKind::ArtifactsChanged => self.refetch_artifacts(),
        }
    }

    pub fn create_artifact(&mut self, title: impl Into<String>, content_markdown: impl Into<String>) {
        let draft = ArtifactDraft {
            title: title.into(),
            content_markdown: content_markdown.into(),
        };
        self.spawn_call(move |backend, workspace| async move {
            let artifacts = match backend.create_artifact(&workspace, &draft).await {
                Ok(_) => backend.fetch_artifacts(&workspace).await,
                Err(err) => Err(err),
            };
            Settlement::ArtifactsEdited(artifacts)
        });
    }

    pub fn update_artifact(
        &mut self,
        id: ArtifactId,
        title: impl Into<String>,
        content_markdown: impl Into<String>,
    ) {
        let draft = ArtifactDraft {
            title: title.into(),
            content_markdown: content_markdown.into(),
        };
        self.spawn_call(move |backend, workspace| async move {
            let artifacts = match backend.update_artifact(&workspace, id, &draft).await {
                Ok(_) => backend.fetch_artifacts(&workspace).await,
                Err(err) => Err(err),
            };
            Settlement::ArtifactsEdited(artifacts)
        });
    }

    pub fn delete_artifact(&mut self, id: ArtifactId) {
        self.spawn_call(move |backend, workspace| async move {
            let artifacts = match backend.delete_artifact(&workspace, id).await {
                Ok(()) => backend.fetch_artifacts(&workspace).await,
                Err(err) => Err(err),
            };
            Settlement::ArtifactsEdited(artifacts)
        });
    }

    pub fn refetch_transcript(&mut self) {
        let reads = Arc::clone(&self.transcript_reads);
        self.spawn_call(|backend, workspace| async move {
            Settlement::Transcript(read_transcript(backend.as_ref(), &workspace, &reads).await)
        });
    }

    pub fn refetch_sources(&mut self) {
        self.spawn_call(|backend, workspace| async move {
            Settlement::Sources(backend.fetch_sources(&workspace).await)
        });
    }

    pub fn refetch_artifacts(&mut self) {
        self.spawn_call(|backend, workspace| async move {
            Settlement::Artifacts(backend.fetch_artifacts(&workspace).await)
        });
    }

    fn refetch_suggestions(&mut self, follow_ups: bool) {
        self.spawn_call(move |backend, workspace| async move {
            let questions = if follow_ups {
                backend.fetch_follow_ups(&workspace).await
            } else {
                backend.fetch_suggestions(&workspace).await
            };
            Settlement::Suggestions(questions)
        });
    }

    fn spawn_call<F, Fut>(&mut self, call: F)
    where
        F: FnOnce(Arc<dyn NotebookBackend>, WorkspaceId) -> Fut,
        Fut: Future<Output = Settlement> + Send + 'static,
    {
        let Some(workspace_id) = self.workspace.clone() else {
            tracing::debug!("no workspace open, skipping backend call");
            return;
        };
        let pending = call(Arc::clone(&self.backend), workspace_id.clone());
        let tx = self.tx.clone();
        let session = self.session;
        self.outstanding += 1;
        tokio::spawn(async move {
            let outcome = pending.await;
            let _ = tx.send(AppEvent::Settled {
                workspace_id,
                session,
                outcome,
            });
        });
    }

    fn push_local(&mut self, role: Role, content: String) {
        let id = self.next_local_id;
        self.next_local_id += 1;
        self.transcript.push(ChatMessage::local(id, role, content));
        self.transcript_revision += 1;
    }

    fn apply_transcript_read(&mut self, read: TranscriptRead) {
        if read.seq <= self.applied_transcript_read {
            tracing::debug!(
                seq = read.seq,
                applied = self.applied_transcript_read,
                "dropping transcript read older than the one shown"
            );
            return;
        }
        self.applied_transcript_read = read.seq;
        self.replace_transcript(read.messages);
    }

    fn replace_transcript(&mut self, messages: Vec<ChatMessage>) {
        let follow_ups = match messages.last() {
            None => Some(false),
            Some(last) if last.role == Role::Assistant => Some(true),
            Some(_) => None,
        };
        self.transcript = messages;
        self.transcript_revision += 1;

        match follow_ups {
            Some(follow_ups) => self.refetch_suggestions(follow_ups),
            None => self.suggestions.clear(),
        }
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Applies events until no spawned backend call is outstanding.
    pub async fn settle(&mut self) {
        loop {
            self.drain_events();
            if self.outstanding == 0 {
                break;
            }
            match self.rx.recv().await {
                Some(event) => self.apply_event(event),
                None => break,
            }
        }
    }

    pub fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Push(notification) => self.on_push(&notification),
            AppEvent::Settled {
                workspace_id,
                session,
                outcome,
            } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if session != self.session {
                    tracing::debug!(
                        workspace_id = %workspace_id,
                        session,
                        current = self.session,
                        call = outcome.label(),
                        "discarding response from a previous session"
                    );
                    return;
                }
                self.apply_settlement(outcome);
            }
        }
    }

    fn apply_settlement(&mut self, outcome: Settlement) {
        match outcome {
            Settlement::Transcript(Ok(read)) => self.apply_transcript_read(read),
            Settlement::Sent(result) => {
                self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
                match result {
                    Ok(read) => self.apply_transcript_read(read),
                    Err(err) => {
                        tracing::warn!(error = %err, "chat send failed");
                        self.push_local(Role::Assistant, SEND_FAILED_MESSAGE.to_string());
                    }
                }
            }
            Settlement::Reset(Ok(())) => self.refetch_transcript(),
            Settlement::Reset(Err(err)) => {
                tracing::warn!(error = %err, "chat reset failed, refetching transcript");
                self.refetch_transcript();
            }
            Settlement::Restored(Ok(read)) => self.apply_transcript_read(read),
            Settlement::Restored(Err(err)) => {
                tracing::warn!(error = %err, "chat restore failed");
                self.push_local(Role::Assistant, RESTORE_FAILED_MESSAGE.to_string());
            }
            Settlement::Sources(Ok(sources)) => {
                let ids: Vec<SourceId> = sources.iter().map(|source| source.id).collect();
                self.sources = sources;
                self.on_sources_refetched(&ids);
            }
            Settlement::Artifacts(Ok(artifacts)) | Settlement::ArtifactsEdited(Ok(artifacts)) => {
                self.artifacts = artifacts;
            }
            Settlement::Suggestions(Ok(questions)) => self.suggestions = questions,
            Settlement::Suggestions(Err(err)) => {
                tracing::debug!(error = %err, "suggestions unavailable");
                self.suggestions.clear();
            }
            Settlement::Transcript(Err(err)) => {
                tracing::warn!(error = %err, "transcript refetch failed");
            }
            Settlement::Sources(Err(err)) => {
                tracing::warn!(error = %err, "source refetch failed");
            }
            Settlement::Artifacts(Err(err)) | Settlement::ArtifactsEdited(Err(err)) => {
                tracing::warn!(error = %err, "artifact call failed");
            }
        }
    }
}

async fn read_transcript(
    backend: &dyn NotebookBackend,
    workspace: &WorkspaceId,
    reads: &AtomicU64,
) -> Result<TranscriptRead> {
    let seq = reads.fetch_add(1, Ordering::SeqCst) + 1;
    let messages = backend.fetch_transcript(workspace).await?;
    Ok(TranscriptRead { seq, messages })
}

#[cfg(test)]
mod tests;
