use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use penny_domain::{MemoryPort, TokenPair};
use penny_error::AgentError;
use tracing::{debug, info};

use crate::slug::slugify;

const MEMORY_FILE: &str = "memories.txt";
const TOKEN_FILE: &str = "token.json";

fn user_dir(data_dir: &Path, user: &str) -> Result<PathBuf, AgentError> {
    Ok(data_dir.join(slugify(user)?))
}

fn io_err(action: &str, path: &Path, e: std::io::Error) -> AgentError {
    AgentError::storage(format!("{action} {}: {e}", path.display()))
}

/// One flat text file per user at `<data_dir>/<slug>/memories.txt`.
/// Saves replace the whole file; concurrent writers race, last one wins.
pub struct FileMemoryStore {
    path: PathBuf,
}

impl FileMemoryStore {
    pub fn new(data_dir: impl AsRef<Path>, user: &str) -> Result<Self, AgentError> {
        let path = user_dir(data_dir.as_ref(), user)?.join(MEMORY_FILE);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<(), AgentError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err("create", dir, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryPort for FileMemoryStore {
    async fn load_memory(&self) -> Result<String, AgentError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                debug!(bytes = text.len(), "loaded memory");
                Ok(text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_parent().await?;
                tokio::fs::write(&self.path, "")
                    .await
                    .map_err(|e| io_err("create", &self.path, e))?;
                info!(path = %self.path.display(), "created empty memory file");
                Ok(String::new())
            }
            Err(e) => Err(io_err("read", &self.path, e)),
        }
    }

    async fn save_memory(&self, memory: &str) -> Result<(), AgentError> {
        self.ensure_parent().await?;
        tokio::fs::write(&self.path, memory)
            .await
            .map_err(|e| io_err("write", &self.path, e))?;
        debug!(bytes = memory.len(), "saved memory");
        Ok(())
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: impl AsRef<Path>, user: &str) -> Result<Self, AgentError> {
        let path = user_dir(data_dir.as_ref(), user)?.join(TOKEN_FILE);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save_tokens(&self, tokens: &TokenPair) -> Result<(), AgentError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err("create", dir, e))?;
        }
        let json = serde_json::to_vec_pretty(tokens)
            .map_err(|e| AgentError::internal(format!("serialize tokens: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| io_err("write", &self.path, e))?;
        info!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    /// Missing file means the user never ran `penny auth`.
    pub async fn load_tokens(&self) -> Result<TokenPair, AgentError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AgentError::not_configured(format!(
                    "no Google tokens at {}; run `penny auth` first",
                    self.path.display()
                )))
            }
            Err(e) => return Err(io_err("read", &self.path, e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::storage(format!("corrupt {}: {e}", self.path.display())))
    }
}
