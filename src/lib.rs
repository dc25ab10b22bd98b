//! doc-search - index a directory of documents and query it from the shell.
//!
//! Documents are indexed for BM25 keyword search via
//! [Tantivy](https://github.com/quickwit-oss/tantivy), optionally with
//! per-chunk [ColBERT](https://github.com/stanford-futuredata/ColBERT)
//! embeddings used to rerank the keyword hits. The index is persisted to a
//! storage directory and reopened by later invocations.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use doc_search::{DocumentSet, QueryOptions, index, walker::Excludes};
//!
//! let documents = DocumentSet::load(Path::new("notes"), &Excludes::default())
//!     .unwrap();
//! let staging = index::staging_dir(Path::new("/tmp/doc-search")).unwrap();
//! let index = index::build_index(&documents, &staging, None)
//!     .unwrap()
//!     .persist(Path::new("/tmp/doc-search"))
//!     .unwrap();
//!
//! let mut engine = index.query_engine(QueryOptions::default());
//! println!("{}", engine.query("rust ownership").unwrap());
//! ```

pub mod chunking;
pub mod cli;
pub mod commands;
pub mod config;
pub mod doc_id;
pub mod documents;
pub mod embedding;
pub mod embedding_db;
pub mod error;
pub mod index;
pub mod model_manager;
pub mod query;
pub mod reranker;
pub mod tantivy_index;
pub mod text_util;
pub mod walker;

pub use config::Config;
pub use doc_id::DocumentId;
pub use documents::{Document, DocumentSet};
pub use embedding_db::EmbeddingDb;
pub use error::{Error, LoadError, Result};
pub use index::{DocumentIndex, build_index, load_index};
pub use model_manager::ModelManager;
pub use query::{QueryEngine, QueryOptions, Response};
pub use tantivy_index::SearchIndex;
