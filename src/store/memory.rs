//! In-memory [`Backend`] implementation for tests and embedding.
//!
//! Keeps the collection in a `Vec` behind a `tokio::sync::RwLock`. Nothing
//! survives the process.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::KnowledgeBase;

use super::Backend;

/// In-memory backend. Insertion order is preserved across saves.
#[derive(Default)]
pub struct MemoryBackend {
    bases: RwLock<Vec<KnowledgeBase>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with an existing collection.
    pub fn with_bases(bases: Vec<KnowledgeBase>) -> Self {
        Self {
            bases: RwLock::new(bases),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_all(&self) -> Result<Vec<KnowledgeBase>> {
        Ok(self.bases.read().await.clone())
    }

    async fn save(&self, kb: &KnowledgeBase) -> Result<()> {
        let mut bases = self.bases.write().await;
        match bases.iter_mut().find(|b| b.id == kb.id) {
            Some(existing) => *existing = kb.clone(),
            None => bases.push(kb.clone()),
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.bases.write().await.retain(|b| b.id != id);
        Ok(())
    }
}
