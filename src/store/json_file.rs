//! File-based backend: the whole collection as one JSON array.
//!
//! The collection is read once when the backend is created and rewritten in
//! full on every mutation. Writes go to a sibling temp file that is renamed
//! over the target, so the file on disk is always a complete snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{KbError, Result};
use crate::models::KnowledgeBase;

use super::Backend;

pub struct JsonFileBackend {
    path: PathBuf,
    bases: Mutex<Vec<KnowledgeBase>>,
}

impl JsonFileBackend {
    /// Open the collection at `path`. A missing file is an empty collection.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bases = Self::read_from_disk(&path).await?;
        debug!(path = %path.display(), count = bases.len(), "knowledge base file loaded");
        Ok(Self {
            path,
            bases: Mutex::new(bases),
        })
    }

    async fn read_from_disk(path: &Path) -> Result<Vec<KnowledgeBase>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            KbError::Storage(format!(
                "corrupt knowledge base file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the full collection to disk.
    async fn flush(&self, bases: &[KnowledgeBase]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(bases)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), count = bases.len(), "knowledge base file flushed");
        Ok(())
    }
}

#[async_trait]
impl Backend for JsonFileBackend {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load_all(&self) -> Result<Vec<KnowledgeBase>> {
        Ok(self.bases.lock().await.clone())
    }

    async fn save(&self, kb: &KnowledgeBase) -> Result<()> {
        let mut bases = self.bases.lock().await;
        let mut next = bases.clone();
        match next.iter_mut().find(|b| b.id == kb.id) {
            Some(existing) => *existing = kb.clone(),
            None => next.push(kb.clone()),
        }
        self.flush(&next).await?;
        *bases = next;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut bases = self.bases.lock().await;
        if !bases.iter().any(|b| b.id == id) {
            return Ok(());
        }
        let next: Vec<KnowledgeBase> = bases.iter().filter(|b| b.id != id).cloned().collect();
        self.flush(&next).await?;
        *bases = next;
        Ok(())
    }
}
