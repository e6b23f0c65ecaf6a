use crate::error::{ClientError, Result};
use crate::session::WorkspaceId;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

pub const RECENT_WORKSPACES_KEY: &str = "recent_workspaces";
const RECENT_WORKSPACES_LIMIT: usize = 10;

/// Small key/value port for client-side state that outlives a process.
pub trait StoragePort: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_state_dir() -> PathBuf {
    home_dir().join(".notebook-sync")
}

/// One file per key under a state directory. Writes go through a temp file
/// and a rename so a crash never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

impl StoragePort for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read stored value");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let final_path = self.key_path(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", sanitize_key(key)));

        fs::write(&tmp_path, value)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if final_path.exists() {
                    fs::remove_file(&final_path)?;
                    fs::rename(&tmp_path, &final_path)?;
                    Ok(())
                } else {
                    Err(ClientError::Storage(format!(
                        "failed to write {}: {rename_err}",
                        final_path.display()
                    )))
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn sanitize_key(raw: &str) -> String {
    let out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

pub fn recent_workspaces(storage: &dyn StoragePort) -> Vec<WorkspaceId> {
    let Some(raw) = storage.get(RECENT_WORKSPACES_KEY) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<WorkspaceId>>(&raw) {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable recent workspace list");
            Vec::new()
        }
    }
}

/// Moves `id` to the front of the recent list.
pub fn remember_workspace(storage: &mut dyn StoragePort, id: &WorkspaceId) -> Result<()> {
    let mut ids = recent_workspaces(storage);
    ids.retain(|existing| existing != id);
    ids.insert(0, id.clone());
    ids.truncate(RECENT_WORKSPACES_LIMIT);
    let raw = serde_json::to_string(&ids)?;
    storage.set(RECENT_WORKSPACES_KEY, &raw)
}

pub fn forget_workspace(storage: &mut dyn StoragePort, id: &WorkspaceId) -> Result<()> {
    let mut ids = recent_workspaces(storage);
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() == before {
        return Ok(());
    }
    if ids.is_empty() {
        return storage.remove(RECENT_WORKSPACES_KEY);
    }
    let raw = serde_json::to_string(&ids)?;
    storage.set(RECENT_WORKSPACES_KEY, &raw)
}
