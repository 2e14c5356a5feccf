//! # KB Harness
//!
//! A small knowledge-base engine: ingest documents, pasted text, and web
//! pages into named knowledge bases, split them into overlapping
//! sentence-aligned chunks, and retrieve the most relevant chunks for a
//! question, either as a ranked list or packed into a token-budgeted block
//! ready for a prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────────────┐
//! │  Extract  │──▶│  Chunk   │──▶│ KnowledgeBase    │
//! │ PDF/DOCX/ │   │ sentence │   │ Store (per-base  │
//! │ URL/text  │   │ + overlap│   │ lock, JSON file) │
//! └───────────┘   └──────────┘   └────────┬─────────┘
//!                                         │
//!                      ┌──────────────────┤
//!                      ▼                  ▼
//!                 ┌──────────┐      ┌───────────┐
//!                 │  Search  │─────▶│  Context  │
//!                 │  top-K   │      │  packing  │
//!                 └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb create handbook --description "team handbook"
//! kb add <id> --kind pdf --file ./handbook.pdf
//! kb add <id> --kind url --url https://example.com/faq
//! kb query <id> "how do I request leave"
//! kb context <id> "how do I request leave" --max-tokens 1500
//! ```
//!
//! ## Library use
//!
//! ```rust,no_run
//! use kb_harness::chunk::ChunkerOptions;
//! use kb_harness::context::build_context;
//! use kb_harness::models::{NewSource, SourceKind};
//! use kb_harness::store::KnowledgeBaseStore;
//!
//! # async fn demo() -> kb_harness::error::Result<()> {
//! let store = KnowledgeBaseStore::in_memory(ChunkerOptions::default()).await?;
//! let kb = store.create("pets", "").await?;
//! store
//!     .add_source(&kb.id, NewSource::new(SourceKind::PastedText, "Cats often sleep sixteen hours a day."))
//!     .await?;
//! let _context = build_context(&store, &kb.id, "how long do cats sleep", None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Knowledge bases, sources, chunks |
//! | [`token`] | Token estimate |
//! | [`chunk`] | Sentence chunking with overlap |
//! | [`extract`] | PDF, DOCX, HTML, and URL text extraction |
//! | [`store`] | Knowledge base store and persistence backends |
//! | [`search`] | Relevance scoring and top-K retrieval |
//! | [`context`] | Token-budgeted context assembly |
//! | [`ingest`] | Source ingestion |
//! | [`bases`] | Knowledge base management commands |
//! | [`error`] | Error taxonomy |

pub mod bases;
pub mod chunk;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod search;
pub mod store;
pub mod token;
