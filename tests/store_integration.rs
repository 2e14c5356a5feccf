//! Store, retrieval, and context assembly exercised through the public API
//! over a real JSON file.

use std::io::Write;
use std::sync::Arc;

use kb_harness::chunk::ChunkerOptions;
use kb_harness::config::FetchConfig;
use kb_harness::context::{assemble_context, build_context, CONTEXT_HEADER};
use kb_harness::ingest::{prepare_source, SourceInput};
use kb_harness::models::{KnowledgeBase, NewSource, SourceContent, SourceKind};
use kb_harness::search::{query, search};
use kb_harness::store::{JsonFileBackend, KnowledgeBaseStore};
use kb_harness::token::estimate_tokens;
use tempfile::TempDir;

async fn file_store(dir: &TempDir, opts: ChunkerOptions) -> KnowledgeBaseStore {
    let backend = JsonFileBackend::open(dir.path().join("kb.json")).await.unwrap();
    KnowledgeBaseStore::open(Arc::new(backend), opts).await.unwrap()
}

fn small_chunks() -> ChunkerOptions {
    ChunkerOptions {
        target_tokens: 40,
        overlap_tokens: 15,
        min_fragment_chars: 20,
    }
}

/// Twelve distinct seven-word sentences, ten estimated tokens each.
fn long_text() -> String {
    (0..12)
        .map(|i| format!("Sentence {} describes the storage engine internals.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn assert_invariants(kb: &KnowledgeBase, min_fragment_chars: usize) {
    assert_eq!(kb.total_chunks, kb.chunks.len());
    assert_eq!(
        kb.total_tokens,
        kb.chunks.iter().map(|c| c.token_count).sum::<usize>()
    );
    for c in &kb.chunks {
        assert!(c.source_index < kb.sources.len());
        assert!(c.text.trim().chars().count() > min_fragment_chars);
        assert_eq!(c.token_count, estimate_tokens(&c.text));
    }
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn test_overlap_between_consecutive_chunks() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir, small_chunks()).await;
    let kb = store.create("engine", "").await.unwrap();
    store
        .add_source(&kb.id, NewSource::new(SourceKind::PlainText, long_text()))
        .await
        .unwrap();

    let full = store.get_full(&kb.id).await.unwrap();
    assert!(full.chunks.len() >= 2);
    assert_invariants(&full, 20);

    for pair in full.chunks.windows(2) {
        let last_sentence = format!(
            "{}.",
            pair[0].text.rsplit(". ").next().unwrap().trim_end_matches('.')
        );
        assert!(
            pair[1].text.starts_with(&last_sentence),
            "chunk {:?} does not start with {:?}",
            pair[1].text,
            last_sentence
        );
    }
}

#[tokio::test]
async fn test_persisted_collection_reloads() {
    let dir = TempDir::new().unwrap();
    let (id, before) = {
        let store = file_store(&dir, small_chunks()).await;
        let kb = store.create("engine", "storage notes").await.unwrap();
        store
            .add_source(
                &kb.id,
                NewSource::new(SourceKind::PlainText, long_text()).with_label("engine.txt"),
            )
            .await
            .unwrap();
        (kb.id.clone(), store.get_full(&kb.id).await.unwrap())
    };

    let reopened = file_store(&dir, small_chunks()).await;
    assert_eq!(reopened.get_full(&id).await.unwrap(), before);
    assert_eq!(reopened.list_summaries().await.len(), 1);
}

#[tokio::test]
async fn test_remove_middle_source_keeps_indices_dense() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir, small_chunks()).await;
    let kb = store.create("mixed", "").await.unwrap();

    for topic in ["billing", "search", "deployment"] {
        let text = format!(
            "The {} service owns its own data. The {} team reviews every change.",
            topic, topic
        );
        store
            .add_source(&kb.id, NewSource::new(SourceKind::PastedText, text))
            .await
            .unwrap();
    }

    store.remove_source(&kb.id, 1).await.unwrap();
    let full = store.get_full(&kb.id).await.unwrap();
    assert_eq!(full.sources.len(), 2);
    assert!(full.chunks.iter().all(|c| !c.text.contains("search")));
    assert_invariants(&full, 20);

    let mut indices: Vec<usize> = full.chunks.iter().map(|c| c.source_index).collect();
    indices.dedup();
    assert_eq!(indices, vec![0, 1]);

    let reopened = file_store(&dir, small_chunks()).await;
    assert_eq!(reopened.get_full(&kb.id).await.unwrap(), full);
}

#[tokio::test]
async fn test_remove_first_of_two_sources() {
    let store = KnowledgeBaseStore::in_memory(ChunkerOptions::default())
        .await
        .unwrap();
    let kb = store.create("two", "").await.unwrap();
    store
        .add_source(
            &kb.id,
            NewSource::new(SourceKind::PlainText, "The first source talks about apples."),
        )
        .await
        .unwrap();
    store
        .add_source(
            &kb.id,
            NewSource::new(SourceKind::PlainText, "The second source talks about pears."),
        )
        .await
        .unwrap();

    store.remove_source(&kb.id, 0).await.unwrap();
    let full = store.get_full(&kb.id).await.unwrap();
    assert!(full.chunks.iter().all(|c| c.source_index != 1));
    assert_eq!(full.chunks.len(), 1);
    assert_eq!(full.chunks[0].source_index, 0);
    assert!(full.chunks[0].text.contains("pears"));
}

#[tokio::test]
async fn test_docx_source_is_searchable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("runbook.docx");
    std::fs::write(
        &path,
        docx_bytes(&[
            "Restart the ingest worker when the queue stalls.",
            "Rotate credentials every ninety days.",
        ]),
    )
    .unwrap();

    let source = prepare_source(
        SourceKind::DocumentDocx,
        SourceInput::File(path),
        None,
        &FetchConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(source.label.as_deref(), Some("runbook.docx"));
    assert!(matches!(source.content, SourceContent::Text(_)));

    let store = file_store(&dir, ChunkerOptions::default()).await;
    let kb = store.create("ops", "").await.unwrap();
    store.add_source(&kb.id, source).await.unwrap();

    let results = query(&store, &kb.id, "when should credentials rotate", None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains("Rotate credentials"));
}

#[tokio::test]
async fn test_context_respects_budget_across_sources() {
    let store = KnowledgeBaseStore::in_memory(small_chunks()).await.unwrap();
    let kb = store.create("engine", "").await.unwrap();
    store
        .add_source(&kb.id, NewSource::new(SourceKind::PlainText, long_text()))
        .await
        .unwrap();

    for budget in [5, 30, 60, 120, 4000] {
        let text = build_context(&store, &kb.id, "storage engine", Some(budget))
            .await
            .unwrap();
        assert!(estimate_tokens(&text) <= budget, "budget {}", budget);
        if !text.is_empty() {
            assert!(text.starts_with(CONTEXT_HEADER));
        }
    }
}

#[tokio::test]
async fn test_context_follows_ranking_order() {
    let store = KnowledgeBaseStore::in_memory(ChunkerOptions::default())
        .await
        .unwrap();
    let kb = store.create("mixed", "").await.unwrap();
    for text in [
        "Indexes speed up reads but slow down writes in most storage engines today.",
        "Index index index tuning.",
    ] {
        store
            .add_source(&kb.id, NewSource::new(SourceKind::PlainText, text))
            .await
            .unwrap();
    }

    let ranked = search(&store, &kb.id, "index", None).await.unwrap();
    let chunks: Vec<_> = ranked.iter().map(|r| r.chunk.clone()).collect();
    assert_eq!(chunks[0].text, "Index index index tuning.");

    let assembled = assemble_context(&chunks, 4000);
    let text = build_context(&store, &kb.id, "index", None).await.unwrap();
    assert_eq!(text, assembled.text);
    let first = text.find("Index index").unwrap();
    let second = text.find("Indexes speed").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn test_deleted_base_is_gone_after_reload() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir, ChunkerOptions::default()).await;
    let keep = store.create("keep", "").await.unwrap();
    let gone = store.create("gone", "").await.unwrap();
    store.delete(&gone.id).await.unwrap();

    let reopened = file_store(&dir, ChunkerOptions::default()).await;
    let ids: Vec<String> = reopened
        .list_summaries()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![keep.id]);
    assert!(query(&reopened, &gone.id, "anything here", None)
        .await
        .unwrap()
        .is_empty());
}
