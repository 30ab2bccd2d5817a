use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;

/// The single persisted entry: the last display name that connected.
#[async_trait]
pub trait NameStore: Send + Sync {
    async fn load(&self) -> Option<String>;
    async fn save(&self, name: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredName {
    username: String,
}

pub struct FileNameStore {
    path: PathBuf,
}

impl FileNameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileNameStore { path: path.into() }
    }
}

#[async_trait]
impl NameStore for FileNameStore {
    async fn load(&self) -> Option<String> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<StoredName>(&content) {
            Ok(stored) if !stored.username.is_empty() => Some(stored.username),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring corrupt name file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    async fn save(&self, name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_vec(&StoredName {
            username: name.to_string(),
        })?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryNameStore {
    value: Mutex<Option<String>>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        MemoryNameStore {
            value: Mutex::new(Some(name.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl NameStore for MemoryNameStore {
    async fn load(&self) -> Option<String> {
        self.slot().clone()
    }

    async fn save(&self, name: &str) -> Result<()> {
        *self.slot() = Some(name.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
