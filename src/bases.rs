//! CLI runners for knowledge base management.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{KnowledgeBaseSummary, KnowledgeBaseUpdate};
use crate::store::open_store;

pub async fn run_create(config: &Config, name: &str, description: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Knowledge base name must not be empty.");
    }
    let store = open_store(config).await?;
    let summary = store.create(name.trim(), description).await?;
    println!("Created knowledge base '{}'", summary.name);
    println!("  id: {}", summary.id);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let summaries = store.list_summaries().await;
    if summaries.is_empty() {
        println!("No knowledge bases.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<24}  {:>7}  {:>6}  {:>8}",
        "ID", "NAME", "SOURCES", "CHUNKS", "TOKENS"
    );
    for s in &summaries {
        println!(
            "{:<36}  {:<24}  {:>7}  {:>6}  {:>8}",
            s.id,
            truncate(&s.name, 24),
            s.sources.len(),
            s.total_chunks,
            s.total_tokens
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: &str, show_chunks: bool) -> Result<()> {
    let store = open_store(config).await?;
    let kb = store.get_full(id).await?;

    print_summary(&kb.summary());

    if !kb.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, src) in kb.sources.iter().enumerate() {
            let label = src
                .label
                .as_deref()
                .or(src.url.as_deref())
                .unwrap_or("(unlabeled)");
            let chunks = kb.chunks.iter().filter(|c| c.source_index == i).count();
            print!("  [{}] {:<14} {}  ({} chunks", i, src.kind, label, chunks);
            if let Some(pages) = src.page_count {
                print!(", {} pages", pages);
            }
            println!(")");
        }
    }

    if show_chunks {
        println!();
        println!("Chunks:");
        for c in &kb.chunks {
            match c.page_number {
                Some(p) => println!(
                    "  {} (source {}, page {}, {} tokens)",
                    c.id, c.source_index, p, c.token_count
                ),
                None => println!(
                    "  {} (source {}, {} tokens)",
                    c.id, c.source_index, c.token_count
                ),
            }
            println!("    {}", c.text.replace('\n', " "));
        }
    }
    Ok(())
}

pub async fn run_update(
    config: &Config,
    id: &str,
    name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    if name.is_none() && description.is_none() {
        bail!("Nothing to update. Pass --name and/or --description.");
    }
    if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        bail!("Knowledge base name must not be empty.");
    }
    let store = open_store(config).await?;
    let summary = store
        .update(id, KnowledgeBaseUpdate { name, description })
        .await?;
    println!("Updated knowledge base {}", summary.id);
    print_summary(&summary);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.delete(id).await?;
    println!("Deleted knowledge base {}", id);
    Ok(())
}

fn print_summary(s: &KnowledgeBaseSummary) {
    println!("{}", s.name);
    println!("  id: {}", s.id);
    if !s.description.is_empty() {
        println!("  description: {}", s.description);
    }
    println!("  sources: {}", s.sources.len());
    println!("  chunks: {}", s.total_chunks);
    println!("  tokens: {}", s.total_tokens);
    println!("  created: {}", s.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  updated: {}", s.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
