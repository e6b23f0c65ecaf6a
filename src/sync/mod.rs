use crate::error::Result;
use crate::session::WorkspaceId;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;

mod ws;

pub use ws::WsConnector;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    SourcesChanged,
    ChatMessage,
    ArtifactsChanged,
}

impl PushKind {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "sources_changed" => Some(Self::SourcesChanged),
            "chat_message" => Some(Self::ChatMessage),
            "artifacts_changed" => Some(Self::ArtifactsChanged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourcesChanged => "sources_changed",
            Self::ChatMessage => "chat_message",
            Self::ArtifactsChanged => "artifacts_changed",
        }
    }
}

/// "Something changed, refetch." Carries no data beyond what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub workspace_id: WorkspaceId,
    pub kind: PushKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    Other,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self, workspace: &WorkspaceId) -> Result<FrameStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

pub type PushHandler = Arc<dyn Fn(&PushNotification) + Send + Sync>;

type HandlerMap = HashMap<PushKind, Vec<PushHandler>>;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decodes one text frame. Malformed frames and unknown types yield `None`.
pub fn decode_frame(text: &str) -> Option<PushKind> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed push frame");
            return None;
        }
    };
    let kind = PushKind::from_wire(&envelope.kind);
    if kind.is_none() {
        tracing::debug!(push_type = %envelope.kind, "ignoring unknown push type");
    }
    kind
}

/// Auto-reconnecting push link bound to at most one workspace at a time.
///
/// Every link task captures the generation current when it was spawned. Any
/// `open` for another workspace or `close` bumps the generation, and a task
/// that finds itself stale (mid-pump, after connecting, or when a scheduled
/// reconnect fires) exits without touching the socket again.
pub struct SyncChannel {
    connector: Arc<dyn PushConnector>,
    handlers: Arc<RwLock<HandlerMap>>,
    generation: watch::Sender<u64>,
    state: Arc<Mutex<(u64, ChannelState)>>,
    reconnect_delay: Duration,
    active: Option<WorkspaceId>,
}

impl SyncChannel {
    pub fn new(connector: Arc<dyn PushConnector>, reconnect_delay: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            connector,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            generation,
            state: Arc::new(Mutex::new((0, ChannelState::Closed))),
            reconnect_delay,
            active: None,
        }
    }

    pub fn register_handler<F>(&self, kind: PushKind, handler: F)
    where
        F: Fn(&PushNotification) + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    pub fn workspace(&self) -> Option<&WorkspaceId> {
        self.active.as_ref()
    }

    pub fn state(&self) -> ChannelState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .1
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Must be called from within a tokio runtime.
    pub fn open(&mut self, workspace_id: WorkspaceId) {
        if self.active.as_ref() == Some(&workspace_id) {
            return;
        }
        self.close();

        self.generation.send_modify(|generation| *generation += 1);
        let generation = self.generation();
        set_state(&self.state, generation, ChannelState::Connecting);

        tracing::info!(workspace_id = %workspace_id, generation, "opening push channel");
        let link = Link {
            workspace_id: workspace_id.clone(),
            generation,
            token: self.generation.subscribe(),
            connector: Arc::clone(&self.connector),
            handlers: Arc::clone(&self.handlers),
            state: Arc::clone(&self.state),
            reconnect_delay: self.reconnect_delay,
        };
        tokio::spawn(link.run());
        self.active = Some(workspace_id);
    }

    pub fn close(&mut self) {
        let Some(workspace_id) = self.active.take() else {
            return;
        };
        self.generation.send_modify(|generation| *generation += 1);
        let generation = self.generation();
        set_state(&self.state, generation, ChannelState::Closed);
        tracing::info!(workspace_id = %workspace_id, "closed push channel");
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_state(state: &Mutex<(u64, ChannelState)>, generation: u64, next: ChannelState) {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = (generation, next);
}

enum PumpEnd {
    Disconnected,
    Superseded,
}

struct Link {
    workspace_id: WorkspaceId,
    generation: u64,
    token: watch::Receiver<u64>,
    connector: Arc<dyn PushConnector>,
    handlers: Arc<RwLock<HandlerMap>>,
    state: Arc<Mutex<(u64, ChannelState)>>,
    reconnect_delay: Duration,
}

impl Link {
    fn is_current(&self) -> bool {
        *self.token.borrow() == self.generation
    }

    /// Only the link owning the current generation may publish its state.
    fn transition(&self, next: ChannelState) {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.0 != self.generation || !self.is_current() {
            return;
        }
        guard.1 = next;
        tracing::debug!(
            workspace_id = %self.workspace_id,
            generation = self.generation,
            state = next.as_str(),
            "push channel state changed"
        );
    }

    async fn run(mut self) {
        loop {
            if !self.is_current() {
                break;
            }
            self.transition(ChannelState::Connecting);

            match self.connector.connect(&self.workspace_id).await {
                Ok(frames) => {
                    if !self.is_current() {
                        break;
                    }
                    self.transition(ChannelState::Open);
                    tracing::info!(workspace_id = %self.workspace_id, "push channel open");
                    if let PumpEnd::Superseded = self.pump(frames).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        workspace_id = %self.workspace_id,
                        error = %err,
                        "push channel connect failed"
                    );
                }
            }

            if !self.is_current() {
                break;
            }
            self.transition(ChannelState::Closed);
            tracing::debug!(
                workspace_id = %self.workspace_id,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "scheduling push channel reconnect"
            );
            tokio::time::sleep(self.reconnect_delay).await;
            if !self.is_current() {
                tracing::debug!(
                    workspace_id = %self.workspace_id,
                    generation = self.generation,
                    "dropping stale reconnect"
                );
                break;
            }
        }
    }

    async fn pump(&mut self, mut frames: FrameStream) -> PumpEnd {
        loop {
            tokio::select! {
                changed = self.token.changed() => {
                    if changed.is_err() || !self.is_current() {
                        return PumpEnd::Superseded;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Other)) => {}
                    Some(Ok(Frame::Close)) | None => return PumpEnd::Disconnected,
                    Some(Err(err)) => {
                        tracing::warn!(
                            workspace_id = %self.workspace_id,
                            error = %err,
                            "push channel read failed"
                        );
                        return PumpEnd::Disconnected;
                    }
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let Some(kind) = decode_frame(text) else {
            return;
        };
        let notification = PushNotification {
            workspace_id: self.workspace_id.clone(),
            kind,
        };
        let handlers = {
            let map = self
                .handlers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.get(&kind).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(&notification);
        }
    }
}
