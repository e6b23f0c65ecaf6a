use crate::session::storage::default_state_dir;
use crate::session::WorkspaceId;
use crate::sync::DEFAULT_RECONNECT_DELAY;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "notebook-sync", about = "Terminal client for a shared notebook workspace")]
pub struct Cli {
    /// Notebook server root, e.g. http://localhost:8000
    #[arg(long, env = "NOTEBOOK_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: Url,

    /// Workspace to open. Defaults to the most recently opened one.
    #[arg(long, short = 'w', env = "NOTEBOOK_WORKSPACE")]
    pub workspace: Option<String>,

    /// Team used to list workspaces when none is given or remembered.
    #[arg(long, env = "NOTEBOOK_TEAM")]
    pub team: Option<String>,

    /// Where client-side state (recent workspaces) is kept.
    #[arg(long, env = "NOTEBOOK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[arg(long, env = "NOTEBOOK_RECONNECT_MS", default_value_t = DEFAULT_RECONNECT_DELAY.as_millis() as u64)]
    pub reconnect_ms: u64,

    #[arg(long, env = "NOTEBOOK_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    /// tracing filter directive; RUST_LOG wins when set.
    #[arg(long, env = "NOTEBOOK_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub workspace: Option<WorkspaceId>,
    pub team: Option<String>,
    pub state_dir: PathBuf,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl Cli {
    pub fn to_config(&self) -> Config {
        Config {
            base_url: self.base_url.clone(),
            workspace: self
                .workspace
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(WorkspaceId::from),
            team: self.team.clone(),
            state_dir: self.state_dir.clone().unwrap_or_else(default_state_dir),
            reconnect_delay: Duration::from_millis(self.reconnect_ms),
            request_timeout: Duration::from_secs(self.timeout_secs),
            log_filter: self.log_level.clone(),
        }
    }
}
