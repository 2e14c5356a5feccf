//! Knowledge base storage.
//!
//! [`KnowledgeBaseStore`] owns the collection of knowledge bases and is the
//! only way sources and chunks enter or leave it. Persistence goes through
//! the [`Backend`] trait, so the same store logic runs over a JSON file
//! ([`JsonFileBackend`]) or purely in memory ([`MemoryBackend`]).
//!
//! # Concurrency
//!
//! The collection is loaded once when the store opens. Each knowledge base
//! lives behind its own `tokio::sync::Mutex`: writers to the same base
//! serialize, writers to different bases do not block each other. Every
//! mutation works on a copy, persists it, and only then replaces the
//! in-memory value, so a failed write leaves the store unchanged.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create`](KnowledgeBaseStore::create) | New empty knowledge base |
//! | [`update`](KnowledgeBaseStore::update) | Change name/description |
//! | [`delete`](KnowledgeBaseStore::delete) | Drop a base with all sources and chunks |
//! | [`list_summaries`](KnowledgeBaseStore::list_summaries) | All bases without chunks |
//! | [`get_full`](KnowledgeBaseStore::get_full) | One base including chunks |
//! | [`add_source`](KnowledgeBaseStore::add_source) | Chunk and append a source |
//! | [`remove_source`](KnowledgeBaseStore::remove_source) | Drop a source and renumber |

pub mod json_file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::chunk::{chunk_source, ChunkerOptions};
use crate::config::Config;
use crate::error::{KbError, Result};
use crate::models::{
    AddSourceOutcome, KnowledgeBase, KnowledgeBaseSummary, KnowledgeBaseUpdate, NewSource,
    Source, SourceContent,
};

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

/// Persistence for the knowledge base collection.
///
/// Every call sees or writes whole [`KnowledgeBase`] records; there is no
/// partial update.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name for logs (e.g. `"json-file"`, `"memory"`).
    fn name(&self) -> &str;

    /// Load the full collection.
    async fn load_all(&self) -> Result<Vec<KnowledgeBase>>;

    /// Insert or replace one knowledge base.
    async fn save(&self, kb: &KnowledgeBase) -> Result<()>;

    /// Remove a knowledge base. Removing an unknown id is not an error.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// A knowledge base plus a tombstone flag set by `delete`.
///
/// A writer that cloned the handle before the delete sees the flag once it
/// gets the lock, instead of writing the base back to the backend.
struct Slot {
    kb: KnowledgeBase,
    deleted: bool,
}

type SlotHandle = Arc<Mutex<Slot>>;

pub struct KnowledgeBaseStore {
    backend: Arc<dyn Backend>,
    chunker: ChunkerOptions,
    bases: RwLock<HashMap<String, SlotHandle>>,
}

/// Open the file-backed store configured in `[store]`.
pub async fn open_store(config: &Config) -> Result<KnowledgeBaseStore> {
    let backend = JsonFileBackend::open(&config.store.path).await?;
    KnowledgeBaseStore::open(Arc::new(backend), ChunkerOptions::from(&config.chunking)).await
}

/// Reject a loaded record whose chunks point past its sources.
fn check_source_indices(kb: &KnowledgeBase) -> Result<()> {
    match kb.chunks.iter().find(|c| c.source_index >= kb.sources.len()) {
        Some(chunk) => Err(KbError::Storage(format!(
            "knowledge base {}: chunk {} has source index {} but only {} sources",
            kb.id,
            chunk.id,
            chunk.source_index,
            kb.sources.len()
        ))),
        None => Ok(()),
    }
}

impl KnowledgeBaseStore {
    /// Load the collection from `backend`.
    pub async fn open(backend: Arc<dyn Backend>, chunker: ChunkerOptions) -> Result<Self> {
        let loaded = backend.load_all().await?;
        debug!(backend = backend.name(), count = loaded.len(), "knowledge bases loaded");
        let mut bases = HashMap::with_capacity(loaded.len());
        for mut kb in loaded {
            check_source_indices(&kb)?;
            // Stored totals are never trusted.
            kb.recompute_totals();
            bases.insert(kb.id.clone(), Arc::new(Mutex::new(Slot { kb, deleted: false })));
        }
        Ok(Self {
            backend,
            chunker,
            bases: RwLock::new(bases),
        })
    }

    /// A store that lives only in memory.
    pub async fn in_memory(chunker: ChunkerOptions) -> Result<Self> {
        Self::open(Arc::new(MemoryBackend::new()), chunker).await
    }

    async fn slot(&self, id: &str) -> Result<SlotHandle> {
        self.bases
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::KnowledgeBaseNotFound(id.to_string()))
    }

    /// Run `f` against a copy of the base, persist it, then commit.
    ///
    /// Also returns the summary of the committed base, taken under the same
    /// lock.
    async fn mutate<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut KnowledgeBase) -> Result<T>,
    ) -> Result<(T, KnowledgeBaseSummary)> {
        let handle = self.slot(id).await?;
        let mut slot = handle.lock().await;
        if slot.deleted {
            return Err(KbError::KnowledgeBaseNotFound(id.to_string()));
        }

        let mut next = slot.kb.clone();
        let out = f(&mut next)?;
        next.recompute_totals();
        next.touch();

        self.backend.save(&next).await?;
        slot.kb = next;
        Ok((out, slot.kb.summary()))
    }

    /// Create an empty knowledge base.
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<KnowledgeBaseSummary> {
        let kb = KnowledgeBase::new(name, description);
        self.backend.save(&kb).await?;

        let summary = kb.summary();
        self.bases.write().await.insert(
            kb.id.clone(),
            Arc::new(Mutex::new(Slot { kb, deleted: false })),
        );
        info!(kb_id = %summary.id, name = %summary.name, "knowledge base created");
        Ok(summary)
    }

    /// Merge the provided metadata fields into a knowledge base.
    pub async fn update(
        &self,
        id: &str,
        changes: KnowledgeBaseUpdate,
    ) -> Result<KnowledgeBaseSummary> {
        let ((), summary) = self
            .mutate(id, |kb| {
                if let Some(name) = changes.name {
                    kb.name = name;
                }
                if let Some(description) = changes.description {
                    kb.description = description;
                }
                Ok(())
            })
            .await?;
        Ok(summary)
    }

    /// Delete a knowledge base with all of its sources and chunks.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let handle = self
            .bases
            .write()
            .await
            .remove(id)
            .ok_or_else(|| KbError::KnowledgeBaseNotFound(id.to_string()))?;

        let mut slot = handle.lock().await;
        if let Err(e) = self.backend.remove(id).await {
            // Put it back so memory keeps matching what is persisted.
            drop(slot);
            self.bases.write().await.insert(id.to_string(), handle);
            return Err(e);
        }
        slot.deleted = true;
        info!(kb_id = %id, "knowledge base deleted");
        Ok(())
    }

    /// All knowledge bases without their chunks, oldest first.
    pub async fn list_summaries(&self) -> Vec<KnowledgeBaseSummary> {
        let handles: Vec<SlotHandle> = self.bases.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let slot = handle.lock().await;
            if !slot.deleted {
                summaries.push(slot.kb.summary());
            }
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    /// A knowledge base including its chunks.
    pub async fn get_full(&self, id: &str) -> Result<KnowledgeBase> {
        let handle = self.slot(id).await?;
        let slot = handle.lock().await;
        if slot.deleted {
            return Err(KbError::KnowledgeBaseNotFound(id.to_string()));
        }
        Ok(slot.kb.clone())
    }

    /// Run a read-only closure against a knowledge base without cloning it.
    pub async fn with_base<T>(&self, id: &str, f: impl FnOnce(&KnowledgeBase) -> T) -> Result<T> {
        let handle = self.slot(id).await?;
        let slot = handle.lock().await;
        if slot.deleted {
            return Err(KbError::KnowledgeBaseNotFound(id.to_string()));
        }
        Ok(f(&slot.kb))
    }

    /// Append a source, chunk its text, and append the chunks.
    ///
    /// The new source's index is the number of sources before the append.
    pub async fn add_source(&self, id: &str, source: NewSource) -> Result<AddSourceOutcome> {
        let chunker = self.chunker;
        let (outcome, _) = self
            .mutate(id, |kb| {
                let source_index = kb.sources.len();
                let page_count = match &source.content {
                    SourceContent::Pages(pages) if source.kind.is_paginated() => {
                        Some(pages.len())
                    }
                    _ => None,
                };
                let chunks = chunk_source(&source.content, source_index, &chunker);
                let outcome = AddSourceOutcome {
                    chunks_added: chunks.len(),
                    tokens_added: chunks.iter().map(|c| c.token_count).sum(),
                };

                kb.sources.push(Source {
                    kind: source.kind,
                    label: source.label,
                    url: source.url,
                    ingested_at: Utc::now(),
                    page_count,
                });
                kb.chunks.extend(chunks);
                Ok(outcome)
            })
            .await?;

        info!(
            kb_id = %id,
            chunks_added = outcome.chunks_added,
            tokens_added = outcome.tokens_added,
            "source added"
        );
        Ok(outcome)
    }

    /// Remove the source at `source_index` and every chunk derived from it.
    ///
    /// Chunks of later sources are renumbered down by one so indices stay
    /// dense and zero-based. Returns the removed source record.
    pub async fn remove_source(&self, id: &str, source_index: usize) -> Result<Source> {
        let (removed, _) = self
            .mutate(id, |kb| {
                if source_index >= kb.sources.len() {
                    return Err(KbError::SourceNotFound {
                        kb_id: kb.id.clone(),
                        index: source_index,
                        len: kb.sources.len(),
                    });
                }
                let removed = kb.sources.remove(source_index);
                kb.chunks.retain(|c| c.source_index != source_index);
                for chunk in kb.chunks.iter_mut() {
                    if chunk.source_index > source_index {
                        chunk.source_index -= 1;
                    }
                }
                Ok(removed)
            })
            .await?;

        info!(kb_id = %id, source_index, kind = %removed.kind, "source removed");
        Ok(removed)
    }
}
