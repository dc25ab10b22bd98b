//! Building, persisting and reopening a document index.
//!
//! A storage directory holds:
//!
//! - `manifest.json`: format version, build metadata and chunking settings
//! - `tantivy/`: the full-text index
//! - `embeddings.redb`: per-chunk ColBERT matrices, only when the index was
//!   built with embeddings

use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::{self, ChunkingConfig},
    documents::DocumentSet,
    embedding,
    embedding_db::EmbeddingDb,
    error::{Error, LoadError, Result},
    model_manager::ModelManager,
    query::{QueryEngine, QueryOptions},
    tantivy_index::{IndexedDocument, SearchIndex},
};

/// Version of the on-disk layout. Indexes with another version are rebuilt.
pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const TANTIVY_DIR: &str = "tantivy";
pub const EMBEDDINGS_FILE: &str = "embeddings.redb";

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Metadata written next to the stores of a built index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    /// Build time in seconds since the Unix epoch.
    pub created_at: u64,
    pub source_dir: PathBuf,
    pub documents: u64,
    pub chunks: u64,
    /// Model the chunks were embedded with; `None` for BM25-only indexes.
    pub model: Option<String>,
    pub chunking: ChunkingConfig,
}

#[derive(Deserialize)]
struct ManifestVersion {
    format_version: u32,
}

#[derive(Deserialize)]
struct ManifestSource {
    source_dir: PathBuf,
}

/// An opened index: the full-text store, optional embeddings and manifest.
#[derive(Debug)]
pub struct DocumentIndex {
    root: PathBuf,
    text: SearchIndex,
    embeddings: Option<EmbeddingDb>,
    manifest: Manifest,
}

/// Build an index of `documents` inside `dir`.
///
/// Any previous contents of `dir` are removed first. With a model every
/// document is chunked and embedded; without one only the full-text index
/// is written.
pub fn build_index(
    documents: &DocumentSet,
    dir: &Path,
    mut model: Option<&mut ModelManager>,
) -> Result<DocumentIndex> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;

    let chunking = model
        .as_deref()
        .map(|m| chunking::resolve_chunking_config(m.model_id()))
        .unwrap_or_default();

    let mut to_embed: Vec<(u64, String)> = Vec::new();
    let text = SearchIndex::create(&dir.join(TANTIVY_DIR))?;
    let mut writer = text.writer(WRITER_MEMORY_BUDGET)?;

    for document in documents.documents() {
        let mut chunks = 0;
        if model.is_some() {
            for chunk in chunking::chunk_text(
                &document.content,
                chunking.chunk_size,
                chunking.overlap,
            ) {
                let id = chunking::chunk_doc_id(document.id.numeric, chunk.index);
                to_embed.push((id, chunk.text));
                chunks += 1;
            }
        }

        text.add_document(
            &writer,
            &IndexedDocument {
                id: &document.id,
                path: &document.relative_path,
                title: &document.title,
                body: &document.content,
                chunks,
                mtime: document.mtime,
            },
        )?;
    }
    writer.commit()?;
    tracing::info!(documents = documents.len(), "full-text index written");

    let embeddings = match model.as_deref_mut() {
        Some(model) => {
            let db = EmbeddingDb::open(&dir.join(EMBEDDINGS_FILE))?;
            let stored = embedding::embed_and_store(model, &db, &to_embed)?;
            tracing::info!(chunks = stored, "embeddings written");
            Some(db)
        }
        None => None,
    };

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        created_at: unix_now(),
        source_dir: documents.root().to_path_buf(),
        documents: documents.len() as u64,
        chunks: to_embed.len() as u64,
        model: model.map(|m| m.model_id().to_string()),
        chunking,
    };
    std::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    Ok(DocumentIndex {
        root: dir.to_path_buf(),
        text,
        embeddings,
        manifest,
    })
}

/// Reopen the index stored in `dir`.
pub fn load_index(dir: &Path) -> std::result::Result<DocumentIndex, LoadError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = match std::fs::read(&manifest_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LoadError::Missing(dir.to_path_buf()));
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: manifest_path,
                source,
            });
        }
    };

    let header: ManifestVersion = serde_json::from_slice(&raw)
        .map_err(|e| LoadError::corrupt(&manifest_path, e))?;
    if header.format_version != FORMAT_VERSION {
        return Err(LoadError::Incompatible {
            path: dir.to_path_buf(),
            found: header.format_version,
            expected: FORMAT_VERSION,
        });
    }
    let manifest: Manifest = serde_json::from_slice(&raw)
        .map_err(|e| LoadError::corrupt(&manifest_path, e))?;

    let tantivy_dir = dir.join(TANTIVY_DIR);
    let text = SearchIndex::open(&tantivy_dir)
        .map_err(|e| LoadError::corrupt(&tantivy_dir, e))?;
    let num_docs = text
        .num_docs()
        .map_err(|e| LoadError::corrupt(&tantivy_dir, e))?;
    if num_docs != manifest.documents {
        return Err(LoadError::corrupt(
            &tantivy_dir,
            format!(
                "holds {num_docs} documents, manifest lists {}",
                manifest.documents
            ),
        ));
    }

    let embeddings = match manifest.model {
        Some(_) => {
            let path = dir.join(EMBEDDINGS_FILE);
            let db = EmbeddingDb::open_existing(&path)
                .map_err(|e| LoadError::corrupt(&path, e))?;
            let stored = db.len().map_err(|e| LoadError::corrupt(&path, e))?;
            if stored != manifest.chunks {
                return Err(LoadError::corrupt(
                    &path,
                    format!(
                        "holds {stored} chunks, manifest lists {}",
                        manifest.chunks
                    ),
                ));
            }
            Some(db)
        }
        None => None,
    };

    tracing::debug!(
        dir = %dir.display(),
        documents = manifest.documents,
        "index loaded"
    );

    Ok(DocumentIndex {
        root: dir.to_path_buf(),
        text,
        embeddings,
        manifest,
    })
}

impl DocumentIndex {
    /// Move this index to `target`, replacing whatever index was there.
    ///
    /// `target` must be absent, empty, or hold only index files. The index
    /// is reopened from its new location.
    pub fn persist(self, target: &Path) -> Result<DocumentIndex> {
        if self.root == target {
            return Ok(self);
        }
        let source = self.root.clone();
        drop(self);

        if target.exists() {
            ensure_replaceable(target)?;
            std::fs::remove_dir_all(target)?;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&source, target)?;
        tracing::debug!(target = %target.display(), "index persisted");

        Ok(load_index(target)?)
    }

    /// A query engine over this index.
    ///
    /// Reranking uses the model the index was built with, loaded on the
    /// first query that needs it.
    pub fn query_engine(&self, options: QueryOptions) -> QueryEngine<'_> {
        let model = match (&self.manifest.model, &self.embeddings) {
            (Some(model_id), Some(_)) if !options.bm25_only => {
                Some(ModelManager::new(model_id.clone()))
            }
            _ => None,
        };
        QueryEngine::new(self, model, options)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.text
    }

    pub fn embeddings(&self) -> Option<&EmbeddingDb> {
        self.embeddings.as_ref()
    }
}

/// The source directory named by the manifest in `dir`, if it can be read.
///
/// Only the `source_dir` field is parsed, so this works for manifests of
/// other format versions and for indexes whose stores are damaged.
pub fn recorded_source_dir(dir: &Path) -> Option<PathBuf> {
    let raw = std::fs::read(dir.join(MANIFEST_FILE)).ok()?;
    let recorded: ManifestSource = serde_json::from_slice(&raw).ok()?;
    Some(recorded.source_dir)
}

/// Sibling directory an index is built in before being persisted to `target`.
pub fn staging_dir(target: &Path) -> Result<PathBuf> {
    let (Some(parent), Some(name)) = (target.parent(), target.file_name())
    else {
        return Err(Error::Config(format!(
            "cannot store an index at {}",
            target.display()
        )));
    };
    let mut staging = std::ffi::OsString::from(".");
    staging.push(name);
    staging.push(".staging");
    Ok(parent.join(staging))
}

/// Refuse to delete a directory holding anything but index files.
fn ensure_replaceable(target: &Path) -> Result<()> {
    if !target.is_dir() {
        return Err(Error::NotADirectory(target.to_path_buf()));
    }
    for entry in std::fs::read_dir(target)? {
        let name = entry?.file_name();
        let known = [MANIFEST_FILE, TANTIVY_DIR, EMBEDDINGS_FILE]
            .iter()
            .any(|n| name == *n);
        if !known {
            return Err(Error::Config(format!(
                "{} contains {}, refusing to replace it with an index",
                target.display(),
                name.to_string_lossy()
            )));
        }
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
