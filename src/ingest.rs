//! Source ingestion.
//!
//! Resolves where a source's material comes from (a local file, inline
//! text, or a URL), runs the matching extractor, and hands the extracted
//! text to the store for chunking.

use std::path::PathBuf;

use anyhow::{bail, Result as AnyResult};
use tracing::debug;

use crate::config::{Config, FetchConfig};
use crate::error::Result;
use crate::extract::{extract_bytes, fetch_url_text};
use crate::models::{NewSource, SourceContent, SourceKind};
use crate::store::open_store;

/// Where the material for a new source comes from.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Bytes of a local file, extracted according to the source kind.
    File(PathBuf),
    /// Already-extracted text.
    Text(String),
    /// A web page fetched and reduced to its visible text.
    Url(String),
}

/// Extract `input` into a [`NewSource`] ready for
/// [`KnowledgeBaseStore::add_source`](crate::store::KnowledgeBaseStore::add_source).
///
/// Files default their label to the file name and URLs to the URL itself.
pub async fn prepare_source(
    kind: SourceKind,
    input: SourceInput,
    label: Option<String>,
    fetch: &FetchConfig,
) -> Result<NewSource> {
    let source = match input {
        SourceInput::File(path) => {
            let bytes = tokio::fs::read(&path).await?;
            debug!(path = %path.display(), bytes = bytes.len(), kind = %kind, "extracting file");
            let content = extract_bytes(kind, &bytes)?;
            let default_label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            let mut source = NewSource::new(kind, content);
            source.label = label.or(default_label);
            source
        }
        SourceInput::Text(text) => {
            let mut source = NewSource::new(kind, SourceContent::Text(text));
            source.label = label;
            source
        }
        SourceInput::Url(url) => {
            let text = fetch_url_text(&url, fetch).await?;
            let mut source = NewSource::new(kind, text);
            source.label = Some(label.unwrap_or_else(|| url.clone()));
            source.with_url(url)
        }
    };
    Ok(source)
}

pub async fn run_add_source(
    config: &Config,
    kb_id: &str,
    kind: &str,
    input: SourceInput,
    label: Option<String>,
) -> AnyResult<()> {
    let kind: SourceKind = kind.parse()?;
    match (&input, kind) {
        (SourceInput::Url(_), k) if k != SourceKind::Url => {
            bail!("--url requires --kind url (got {})", k)
        }
        (SourceInput::Text(_), SourceKind::DocumentPdf | SourceKind::DocumentDocx) => {
            bail!("--kind {} needs --file; inline text is not a document", kind)
        }
        _ => {}
    }

    let store = open_store(config).await?;
    // Fail on an unknown base before doing any extraction work.
    store.with_base(kb_id, |_| ()).await?;

    let source = prepare_source(kind, input, label, &config.fetch).await?;
    let outcome = store.add_source(kb_id, source).await?;

    let kb = store.get_full(kb_id).await?;
    println!("add {} -> {}", kind, kb.name);
    println!("  source index: {}", kb.sources.len().saturating_sub(1));
    println!("  chunks added: {}", outcome.chunks_added);
    println!("  tokens added: {}", outcome.tokens_added);
    println!("  total chunks: {}", kb.total_chunks);
    println!("ok");
    Ok(())
}

pub async fn run_remove_source(config: &Config, kb_id: &str, index: usize) -> AnyResult<()> {
    let store = open_store(config).await?;
    let removed = store.remove_source(kb_id, index).await?;
    let kb = store.get_full(kb_id).await?;

    let label = removed
        .label
        .as_deref()
        .or(removed.url.as_deref())
        .unwrap_or("(unlabeled)");
    println!("Removed source [{}] {} {}", index, removed.kind, label);
    println!("  remaining sources: {}", kb.sources.len());
    println!("  total chunks: {}", kb.total_chunks);
    Ok(())
}
