use super::{
    SendDisposition, SessionStateStore, DEFAULT_WORKSPACE_NAME, RESTORE_FAILED_MESSAGE,
    SEND_FAILED_MESSAGE,
};
use crate::api::{ArtifactDraft, NotebookBackend, SendRequest};
use crate::command::{help_text, teach_prompt};
use crate::error::{ClientError, Result};
use crate::session::storage::{MemoryStorage, RECENT_WORKSPACES_KEY};
use crate::session::{
    Artifact, ArtifactId, ChatMessage, MessageId, Role, SourceId, SourceRef, WorkspaceId,
    WorkspaceSummary,
};
use crate::sync::test_support::{let_tasks_run, text, LinkSender, ScriptedConnector};
use crate::sync::{ChannelState, DEFAULT_RECONNECT_DELAY};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    transcripts: HashMap<WorkspaceId, Vec<ChatMessage>>,
    cleared: HashMap<WorkspaceId, Vec<ChatMessage>>,
    sources: HashMap<WorkspaceId, Vec<SourceRef>>,
    artifacts: HashMap<WorkspaceId, Vec<Artifact>>,
    sent: Vec<(WorkspaceId, SendRequest)>,
    calls: Vec<&'static str>,
    workspaces: Vec<WorkspaceSummary>,
    fail_sends: bool,
    fail_undo: bool,
    /// Applied to every send before it reaches the server state.
    send_delay: Option<Duration>,
    /// Popped per transcript fetch; the snapshot is taken before the delay.
    transcript_delays: VecDeque<Duration>,
    next_id: i64,
}

/// In-memory notebook server keyed by workspace.
#[derive(Default)]
struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().expect("fake backend lock");
        f(&mut state)
    }

    fn record(&self, call: &'static str) {
        self.with(|state| state.calls.push(call));
    }

    fn calls(&self) -> Vec<&'static str> {
        self.with(|state| state.calls.clone())
    }

    fn server_message(state: &mut FakeState, role: Role, content: &str) -> ChatMessage {
        state.next_id += 1;
        ChatMessage {
            id: MessageId::Server(state.next_id),
            role,
            content: content.to_string(),
            cited_sources: None,
            created_at: "2024-05-01T10:00:00".to_string(),
        }
    }

    fn seed_message(&self, workspace: &str, role: Role, content: &str) {
        self.with(|state| {
            let message = Self::server_message(state, role, content);
            state
                .transcripts
                .entry(WorkspaceId::from(workspace))
                .or_default()
                .push(message);
        });
    }

    fn set_sources(&self, workspace: &str, ids: &[SourceId]) {
        let sources = ids
            .iter()
            .map(|id| SourceRef {
                id: *id,
                name: format!("source-{id}"),
                source_type: Some("paste".to_string()),
                url: None,
                created_at: None,
            })
            .collect();
        self.with(|state| {
            state.sources.insert(WorkspaceId::from(workspace), sources);
        });
    }

    fn add_workspace(&self, id: &str, name: &str) {
        self.with(|state| {
            state.workspaces.push(WorkspaceSummary {
                id: WorkspaceId::from(id),
                name: name.to_string(),
            })
        });
    }

    fn server_transcript(&self, workspace: &str) -> Vec<ChatMessage> {
        self.with(|state| {
            state
                .transcripts
                .get(&WorkspaceId::from(workspace))
                .cloned()
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl NotebookBackend for FakeBackend {
    async fn fetch_transcript(&self, workspace: &WorkspaceId) -> Result<Vec<ChatMessage>> {
        self.record("fetch_transcript");
        let (messages, delay) = self.with(|state| {
            let messages = state.transcripts.get(workspace).cloned().unwrap_or_default();
            (messages, state.transcript_delays.pop_front())
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(messages)
    }

    async fn send_message(
        &self,
        workspace: &WorkspaceId,
        request: &SendRequest,
    ) -> Result<ChatMessage> {
        self.record("send_message");
        if let Some(delay) = self.with(|state| state.send_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with(|state| -> Result<ChatMessage> {
            state.sent.push((workspace.clone(), request.clone()));
            if state.fail_sends {
                return Err(ClientError::backend("model unavailable"));
            }
            let question = Self::server_message(state, Role::User, &request.content);
            let answer =
                Self::server_message(state, Role::Assistant, &format!("answer to {}", request.content));
            let transcript = state.transcripts.entry(workspace.clone()).or_default();
            transcript.push(question);
            transcript.push(answer.clone());
            Ok(answer)
        })
    }

    async fn reset_chat(&self, workspace: &WorkspaceId) -> Result<()> {
        self.record("reset_chat");
        self.with(|state| {
            let previous = state.transcripts.remove(workspace).unwrap_or_default();
            state.cleared.insert(workspace.clone(), previous);
        });
        Ok(())
    }

    async fn undo_reset(&self, workspace: &WorkspaceId) -> Result<()> {
        self.record("undo_reset");
        self.with(|state| -> Result<()> {
            if state.fail_undo {
                return Err(ClientError::Status {
                    status: 404,
                    body: "nothing to restore".to_string(),
                });
            }
            if let Some(previous) = state.cleared.remove(workspace) {
                state.transcripts.insert(workspace.clone(), previous);
            }
            Ok(())
        })
    }

    async fn fetch_suggestions(&self, _workspace: &WorkspaceId) -> Result<Vec<String>> {
        self.record("fetch_suggestions");
        Ok(vec!["What are the key themes?".to_string()])
    }

    async fn fetch_follow_ups(&self, _workspace: &WorkspaceId) -> Result<Vec<String>> {
        self.record("fetch_follow_ups");
        Ok(vec!["Can you go deeper?".to_string()])
    }

    async fn fetch_sources(&self, workspace: &WorkspaceId) -> Result<Vec<SourceRef>> {
        self.record("fetch_sources");
        Ok(self.with(|state| state.sources.get(workspace).cloned().unwrap_or_default()))
    }

    async fn fetch_artifacts(&self, workspace: &WorkspaceId) -> Result<Vec<Artifact>> {
        self.record("fetch_artifacts");
        Ok(self.with(|state| state.artifacts.get(workspace).cloned().unwrap_or_default()))
    }

    async fn create_artifact(
        &self,
        workspace: &WorkspaceId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact> {
        self.record("create_artifact");
        Ok(self.with(|state| {
            state.next_id += 1;
            let artifact = Artifact {
                id: state.next_id,
                title: draft.title.clone(),
                content_markdown: draft.content_markdown.clone(),
                created_at: "2024-05-01T10:00:00".to_string(),
                updated_at: "2024-05-01T10:00:00".to_string(),
            };
            state
                .artifacts
                .entry(workspace.clone())
                .or_default()
                .push(artifact.clone());
            artifact
        }))
    }

    async fn update_artifact(
        &self,
        workspace: &WorkspaceId,
        id: ArtifactId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact> {
        self.record("update_artifact");
        self.with(|state| -> Result<Artifact> {
            let artifact = state
                .artifacts
                .get_mut(workspace)
                .and_then(|artifacts| artifacts.iter_mut().find(|artifact| artifact.id == id))
                .ok_or_else(|| ClientError::Status {
                    status: 404,
                    body: "artifact not found".to_string(),
                })?;
            artifact.title = draft.title.clone();
            artifact.content_markdown = draft.content_markdown.clone();
            Ok(artifact.clone())
        })
    }

    async fn delete_artifact(&self, workspace: &WorkspaceId, id: ArtifactId) -> Result<()> {
        self.record("delete_artifact");
        self.with(|state| {
            if let Some(artifacts) = state.artifacts.get_mut(workspace) {
                artifacts.retain(|artifact| artifact.id != id);
            }
        });
        Ok(())
    }

    async fn list_workspaces(&self, _team_id: Option<&str>) -> Result<Vec<WorkspaceSummary>> {
        self.record("list_workspaces");
        Ok(self.with(|state| state.workspaces.clone()))
    }

    async fn create_workspace(
        &self,
        name: &str,
        _team_id: Option<&str>,
    ) -> Result<WorkspaceSummary> {
        self.record("create_workspace");
        Ok(self.with(|state| {
            state.next_id += 1;
            let created = WorkspaceSummary {
                id: WorkspaceId::new(format!("ws-{}", state.next_id)),
                name: name.to_string(),
            };
            state.workspaces.push(created.clone());
            created
        }))
    }

    async fn rename_workspace(
        &self,
        workspace: &WorkspaceId,
        name: &str,
    ) -> Result<WorkspaceSummary> {
        self.record("rename_workspace");
        self.with(|state| -> Result<WorkspaceSummary> {
            let summary = state
                .workspaces
                .iter_mut()
                .find(|summary| &summary.id == workspace)
                .ok_or_else(|| ClientError::Status {
                    status: 404,
                    body: "Workspace not found".to_string(),
                })?;
            summary.name = name.to_string();
            Ok(summary.clone())
        })
    }

    async fn delete_workspace(&self, workspace: &WorkspaceId) -> Result<()> {
        self.record("delete_workspace");
        self.with(|state| {
            state.workspaces.retain(|summary| &summary.id != workspace);
            state.transcripts.remove(workspace);
        });
        Ok(())
    }
}

fn store_with(backend: &Arc<FakeBackend>) -> (SessionStateStore, Arc<ScriptedConnector>, Vec<LinkSender>) {
    let (connector, senders) = ScriptedConnector::with_links(4);
    let connector = Arc::new(connector);
    let store = SessionStateStore::new(
        backend.clone(),
        connector.clone(),
        Box::new(MemoryStorage::new()),
        DEFAULT_RECONNECT_DELAY,
    );
    (store, connector, senders)
}

fn contents(store: &SessionStateStore) -> Vec<(Role, String)> {
    store
        .transcript()
        .iter()
        .map(|message| (message.role, message.content.clone()))
        .collect()
}

fn ids(values: &[SourceId]) -> BTreeSet<SourceId> {
    values.iter().copied().collect()
}

#[tokio::test]
async fn open_loads_workspace_and_enables_every_source() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_message("ws-1", Role::User, "earlier question");
    backend.set_sources("ws-1", &[3, 1, 2]);
    let (mut store, connector, _links) = store_with(&backend);

    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    let_tasks_run().await;

    assert_eq!(store.workspace(), Some(&WorkspaceId::from("ws-1")));
    assert_eq!(
        contents(&store),
        vec![(Role::User, "earlier question".to_string())]
    );
    assert_eq!(store.sources().len(), 3);
    assert_eq!(store.enabled_sources(), &ids(&[1, 2, 3]));
    assert_eq!(store.known_sources(), &ids(&[1, 2, 3]));
    assert_eq!(connector.workspaces(), vec![WorkspaceId::from("ws-1")]);
    assert_eq!(store.channel_state(), ChannelState::Open);
    assert_eq!(store.recent_workspaces(), vec![WorkspaceId::from("ws-1")]);
    assert!(store.storage().get(RECENT_WORKSPACES_KEY).is_some());
}

#[tokio::test]
async fn optimistic_message_is_visible_before_send_settles() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    let disposition = store.send("  hello  ", &BTreeSet::new());
    assert_eq!(disposition, SendDisposition::Submitted);
    assert!(store.is_sending());
    let last = store.transcript().last().expect("optimistic message");
    assert!(last.id.is_local());
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "hello");

    store.settle().await;
    assert!(!store.is_sending());
    assert_eq!(store.transcript(), backend.server_transcript("ws-1").as_slice());
    assert!(store.transcript().iter().all(|message| !message.id.is_local()));
    assert_eq!(
        contents(&store),
        vec![
            (Role::User, "hello".to_string()),
            (Role::Assistant, "answer to hello".to_string()),
        ]
    );
    assert_eq!(store.suggestions(), &["Can you go deeper?".to_string()]);
}

#[tokio::test]
async fn failed_send_keeps_user_message_and_adds_error_bubble() {
    let backend = Arc::new(FakeBackend::default());
    backend.with(|state| state.fail_sends = true);
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.send("hello", &BTreeSet::new());
    store.settle().await;

    assert_eq!(
        contents(&store),
        vec![
            (Role::User, "hello".to_string()),
            (Role::Assistant, SEND_FAILED_MESSAGE.to_string()),
        ]
    );
    assert!(!store.is_sending());
    let sends = backend.calls().iter().filter(|call| **call == "send_message").count();
    assert_eq!(sends, 1);
}

#[tokio::test]
async fn source_filter_is_sent_only_when_non_empty() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.send("all sources", &BTreeSet::new());
    store.settle().await;
    store.send("two sources", &ids(&[4, 2]));
    store.settle().await;

    let sent = backend.with(|state| state.sent.clone());
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1.source_ids, None);
    assert_eq!(sent[1].1.source_ids, Some(vec![2, 4]));
}

#[tokio::test]
async fn teach_without_topic_stays_local() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    let calls_before = backend.calls().len();
    let len_before = store.transcript().len();

    assert_eq!(store.send("/teach", &BTreeSet::new()), SendDisposition::Local);
    store.settle().await;

    assert_eq!(backend.calls().len(), calls_before);
    assert_eq!(store.transcript().len(), len_before + 1);
    let reply = store.transcript().last().expect("usage message");
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.id.is_local());
    assert!(reply.content.starts_with("Usage: /teach"));
}

#[tokio::test]
async fn teach_with_topic_shows_topic_and_sends_lesson_prompt() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.send("/teach binary search", &BTreeSet::new());
    assert_eq!(
        store.transcript().last().map(|message| message.content.as_str()),
        Some("binary search")
    );
    store.settle().await;

    let sent = backend.with(|state| state.sent.clone());
    assert_eq!(sent[0].1.content, teach_prompt("binary search"));
}

#[tokio::test]
async fn help_and_unknown_commands_add_ephemeral_replies_with_unique_ids() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_message("ws-1", Role::User, "kept on server");
    let (mut store, _connector, links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    let_tasks_run().await;
    let calls_before = backend.calls().len();

    store.send("/help", &BTreeSet::new());
    store.send("/frobnicate", &BTreeSet::new());
    store.send("/HELP", &BTreeSet::new());

    let local_ids: Vec<MessageId> = store
        .transcript()
        .iter()
        .filter(|message| message.id.is_local())
        .map(|message| message.id)
        .collect();
    assert_eq!(local_ids.len(), 3);
    assert_ne!(local_ids[0], local_ids[1]);
    assert_ne!(local_ids[1], local_ids[2]);
    assert_eq!(store.transcript()[1].content, help_text());
    assert!(store.transcript()[2].content.contains("/frobnicate"));
    assert_eq!(backend.calls().len(), calls_before);

    // Ephemeral replies vanish on the next authoritative refetch.
    links[0]
        .unbounded_send(text(r#"{"type":"chat_message"}"#))
        .expect("link should be open");
    let_tasks_run().await;
    store.settle().await;
    assert_eq!(
        contents(&store),
        vec![(Role::User, "kept on server".to_string())]
    );
}

#[tokio::test]
async fn new_clears_transcript_and_restore_brings_it_back() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_message("ws-1", Role::User, "first");
    backend.seed_message("ws-1", Role::Assistant, "reply");
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    assert_eq!(store.send("/new", &BTreeSet::new()), SendDisposition::Local);
    assert!(store.transcript().is_empty());
    store.settle().await;
    assert!(store.transcript().is_empty());
    assert!(backend.server_transcript("ws-1").is_empty());
    assert_eq!(store.suggestions(), &["What are the key themes?".to_string()]);
    assert!(!backend.calls().contains(&"send_message"));

    store.send("/restore", &BTreeSet::new());
    store.settle().await;
    assert_eq!(
        contents(&store),
        vec![
            (Role::User, "first".to_string()),
            (Role::Assistant, "reply".to_string()),
        ]
    );
}

#[tokio::test]
async fn failed_restore_reports_locally() {
    let backend = Arc::new(FakeBackend::default());
    backend.with(|state| state.fail_undo = true);
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.send("/restore", &BTreeSet::new());
    store.settle().await;
    assert_eq!(
        contents(&store),
        vec![(Role::Assistant, RESTORE_FAILED_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn late_response_for_previous_workspace_is_discarded() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_message("b", Role::User, "b history");
    backend.set_sources("a", &[1, 2]);
    backend.set_sources("b", &[9]);
    let (mut store, connector, _links) = store_with(&backend);

    store.open(WorkspaceId::from("a"));
    store.send("hello", &BTreeSet::new());
    store.open(WorkspaceId::from("b"));
    assert!(!store.is_sending());
    store.settle().await;

    assert_eq!(contents(&store), vec![(Role::User, "b history".to_string())]);
    assert_eq!(store.known_sources(), &ids(&[9]));
    assert_eq!(store.enabled_sources(), &ids(&[9]));
    assert!(!store.is_sending());
    // The call still reached the server; only its result was dropped.
    assert!(backend
        .server_transcript("a")
        .iter()
        .any(|message| message.content == "hello"));

    let_tasks_run().await;
    assert_eq!(connector.workspaces().last(), Some(&WorkspaceId::from("b")));
    assert_eq!(store.channel_state(), ChannelState::Open);
    assert_eq!(
        store.recent_workspaces(),
        vec![WorkspaceId::from("b"), WorkspaceId::from("a")]
    );
}

#[tokio::test]
async fn duplicate_chat_pushes_converge_on_server_transcript() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    let_tasks_run().await;

    backend.seed_message("ws-1", Role::User, "from a collaborator");
    backend.seed_message("ws-1", Role::Assistant, "their answer");
    for _ in 0..2 {
        links[0]
            .unbounded_send(text(r#"{"type":"chat_message"}"#))
            .expect("link should be open");
    }
    let_tasks_run().await;
    store.settle().await;

    assert_eq!(store.transcript(), backend.server_transcript("ws-1").as_slice());
    assert_eq!(store.transcript().len(), 2);
}

#[tokio::test]
async fn sources_push_reconciles_and_keeps_user_choices() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_sources("ws-1", &[1, 2, 3]);
    let (mut store, _connector, links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    let_tasks_run().await;

    store.toggle_source(2);
    assert_eq!(store.enabled_sources(), &ids(&[1, 3]));

    backend.set_sources("ws-1", &[1, 2, 4]);
    links[0]
        .unbounded_send(text(r#"{"type":"sources_changed"}"#))
        .expect("link should be open");
    let_tasks_run().await;
    store.settle().await;

    assert_eq!(store.known_sources(), &ids(&[1, 2, 4]));
    assert_eq!(store.enabled_sources(), &ids(&[1, 4]));
    assert!(store.enabled_sources().is_subset(store.known_sources()));
}

#[tokio::test]
async fn explicit_selection_stays_within_known_sources() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_sources("ws-1", &[1, 2, 3]);
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.toggle_source(42);
    assert_eq!(store.enabled_sources(), &ids(&[1, 2, 3]));

    store.set_all_sources(&[2, 3, 99]);
    assert_eq!(store.enabled_sources(), &ids(&[2, 3]));

    store.on_sources_refetched(&[2, 5]);
    assert_eq!(store.enabled_sources(), &ids(&[2, 5]));
    assert_eq!(store.known_sources(), &ids(&[2, 5]));
}

#[tokio::test]
async fn send_with_selection_uses_enabled_sources() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_sources("ws-1", &[1, 2]);
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    store.toggle_source(1);

    store.send_with_selection("question");
    store.settle().await;

    let sent = backend.with(|state| state.sent.clone());
    assert_eq!(sent[0].1.source_ids, Some(vec![2]));
}

#[tokio::test]
async fn artifact_edits_refetch_artifact_list() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    store.create_artifact("Summary", "# Notes");
    store.settle().await;
    assert_eq!(store.artifacts().len(), 1);
    let id = store.artifacts()[0].id;

    store.update_artifact(id, "Summary v2", "# Better notes");
    store.settle().await;
    assert_eq!(store.artifacts()[0].title, "Summary v2");

    store.update_artifact(id + 100, "missing", "");
    store.settle().await;
    assert_eq!(store.artifacts()[0].title, "Summary v2");

    backend.with(|state| state.artifacts.clear());
    let_tasks_run().await;
    links[0]
        .unbounded_send(text(r#"{"type":"artifacts_changed"}"#))
        .expect("link should be open");
    let_tasks_run().await;
    store.settle().await;
    assert!(store.artifacts().is_empty());
}

#[tokio::test]
async fn blank_input_and_closed_store_ignore_sends() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);

    assert_eq!(store.send("hello", &BTreeSet::new()), SendDisposition::Ignored);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;
    assert_eq!(store.send("   ", &BTreeSet::new()), SendDisposition::Ignored);

    store.close();
    assert!(store.workspace().is_none());
    assert!(store.transcript().is_empty());
    assert_eq!(store.channel_state(), ChannelState::Closed);
    assert_eq!(store.send("hello", &BTreeSet::new()), SendDisposition::Ignored);
    assert!(backend.with(|state| state.sent.is_empty()));
}

#[tokio::test]
async fn list_workspaces_passes_through_backend() {
    let backend = Arc::new(FakeBackend::default());
    backend.add_workspace("ws-1", "Untitled Notebook");
    let (store, _connector, _links) = store_with(&backend);
    let workspaces = store
        .list_workspaces(Some("team-1"))
        .await
        .expect("workspaces should list");
    assert_eq!(workspaces[0].id, WorkspaceId::from("ws-1"));
}

#[tokio::test(start_paused = true)]
async fn late_failure_from_earlier_session_of_same_workspace_is_discarded() {
    let backend = Arc::new(FakeBackend::default());
    backend.with(|state| {
        state.fail_sends = true;
        state.send_delay = Some(Duration::from_secs(5));
    });
    let (mut store, _connector, _links) = store_with(&backend);

    store.open(WorkspaceId::from("a"));
    store.send("hello", &BTreeSet::new());
    store.open(WorkspaceId::from("b"));
    store.open(WorkspaceId::from("a"));
    store.settle().await;

    assert_eq!(store.workspace(), Some(&WorkspaceId::from("a")));
    assert!(store.transcript().is_empty());
    assert!(!store.is_sending());
}

#[tokio::test(start_paused = true)]
async fn reopening_the_open_workspace_starts_a_fresh_session() {
    let backend = Arc::new(FakeBackend::default());
    backend.with(|state| {
        state.fail_sends = true;
        state.send_delay = Some(Duration::from_secs(5));
    });
    let (mut store, connector, _links) = store_with(&backend);

    store.open(WorkspaceId::from("a"));
    store.send("hello", &BTreeSet::new());
    store.open(WorkspaceId::from("a"));
    store.settle().await;
    let_tasks_run().await;

    assert!(store.transcript().is_empty());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_older_transcript_read_does_not_replace_newer_one() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    backend.with(|state| state.transcript_delays.push_back(Duration::from_secs(5)));
    store.refetch_transcript();
    let_tasks_run().await;
    store.send("hello", &BTreeSet::new());
    store.settle().await;

    assert_eq!(
        contents(&store),
        vec![
            (Role::User, "hello".to_string()),
            (Role::Assistant, "answer to hello".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn refetch_in_flight_during_new_does_not_bring_old_messages_back() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_message("ws-1", Role::User, "old question");
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("ws-1"));
    store.settle().await;

    backend.with(|state| state.transcript_delays.push_back(Duration::from_secs(5)));
    store.refetch_transcript();
    let_tasks_run().await;
    store.send("/new", &BTreeSet::new());
    store.settle().await;

    assert!(store.transcript().is_empty());
    assert!(backend.server_transcript("ws-1").is_empty());
}

#[tokio::test]
async fn open_initial_creates_a_workspace_for_an_empty_team() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);

    let opened = store
        .open_initial(None, Some("team-1"))
        .await
        .expect("a workspace should open");
    store.settle().await;

    assert_eq!(store.workspace(), Some(&opened));
    let workspaces = backend.with(|state| state.workspaces.clone());
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].id, opened);
    assert_eq!(workspaces[0].name, DEFAULT_WORKSPACE_NAME);
}

#[tokio::test]
async fn open_initial_prefers_explicit_then_recent_then_first_listed() {
    let backend = Arc::new(FakeBackend::default());
    backend.add_workspace("first", "First");
    backend.add_workspace("second", "Second");
    let (mut store, _connector, _links) = store_with(&backend);

    let opened = store.open_initial(None, None).await.expect("first should open");
    assert_eq!(opened, WorkspaceId::from("first"));

    store.open(WorkspaceId::from("second"));
    store.open(WorkspaceId::from("gone"));
    let opened = store.open_initial(None, None).await.expect("recent should open");
    assert_eq!(opened, WorkspaceId::from("second"));

    let opened = store
        .open_initial(Some(WorkspaceId::from("first")), None)
        .await
        .expect("explicit should open");
    assert_eq!(opened, WorkspaceId::from("first"));
    assert!(!backend.calls().contains(&"create_workspace"));
    store.settle().await;
}

#[tokio::test]
async fn deleting_workspace_moves_to_next_and_forgets_it() {
    let backend = Arc::new(FakeBackend::default());
    backend.add_workspace("a", "A");
    backend.add_workspace("b", "B");
    let (mut store, _connector, _links) = store_with(&backend);
    store.open(WorkspaceId::from("b"));
    store.open(WorkspaceId::from("a"));
    store.settle().await;

    let next = store.delete_workspace(None).await.expect("delete should succeed");
    assert_eq!(next, Some(WorkspaceId::from("b")));
    assert_eq!(store.workspace(), Some(&WorkspaceId::from("b")));
    assert_eq!(store.recent_workspaces(), vec![WorkspaceId::from("b")]);

    let next = store.delete_workspace(None).await.expect("delete should succeed");
    assert_eq!(next, None);
    assert!(store.workspace().is_none());
    assert!(store.recent_workspaces().is_empty());
    assert!(matches!(
        store.delete_workspace(None).await,
        Err(ClientError::NoWorkspace)
    ));
    store.settle().await;
}

#[tokio::test]
async fn create_and_rename_workspace() {
    let backend = Arc::new(FakeBackend::default());
    let (mut store, _connector, _links) = store_with(&backend);
    assert!(matches!(
        store.rename_workspace("Nope").await,
        Err(ClientError::NoWorkspace)
    ));

    let created = store
        .create_workspace("Reading list", Some("team-1"))
        .await
        .expect("workspace should be created");
    assert_eq!(store.workspace(), Some(&created.id));

    let renamed = store
        .rename_workspace("Papers")
        .await
        .expect("workspace should be renamed");
    assert_eq!(renamed.name, "Papers");
    assert_eq!(backend.with(|state| state.workspaces[0].name.clone()), "Papers");
    store.settle().await;
}
