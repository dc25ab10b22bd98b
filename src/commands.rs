//! The two things the binary does: build an index, or answer a query.

use std::path::{Path, PathBuf};

use crate::{
    config::Config,
    documents::DocumentSet,
    error::{Error, Result},
    index::{self, DocumentIndex},
    model_manager::ModelManager,
    query::{QueryOptions, Response},
    walker::Excludes,
};

/// Index every document under `directory` and persist the result to
/// `config.persist_dir`, replacing any previous index.
pub fn build(config: &Config, directory: &Path) -> Result<DocumentIndex> {
    let directory = std::path::absolute(directory)?;
    tracing::info!("Creating new index of {}", directory.display());

    let excludes = Excludes::new(&config.excludes)?;
    let documents = DocumentSet::load(&directory, &excludes)?;

    let staging = index::staging_dir(&config.persist_dir)?;
    let mut model = config
        .embeddings
        .then(|| ModelManager::new(config.model_id.clone()));

    let built = index::build_index(&documents, &staging, model.as_mut())
        .and_then(|index| index.persist(&config.persist_dir));
    if built.is_err() && staging.exists() {
        if let Err(e) = std::fs::remove_dir_all(&staging) {
            tracing::warn!(
                "cannot remove staging directory {}: {e}",
                staging.display()
            );
        }
    }
    built
}

/// Open the persisted index, rebuilding it when it is missing, corrupt or
/// from another format version.
pub fn open_or_rebuild(config: &Config) -> Result<DocumentIndex> {
    match index::load_index(&config.persist_dir) {
        Ok(index) => Ok(index),
        Err(e) if e.should_rebuild() => {
            let source = rebuild_source(config)?;
            tracing::warn!("{e}; rebuilding from {}", source.display());
            build(config, &source)
        }
        Err(e) => Err(Error::Load(e)),
    }
}

/// Directory a fallback rebuild reads: the configured source directory,
/// else the one the unusable index was built from if it still exists,
/// else the working directory.
fn rebuild_source(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.source_dir {
        return Ok(dir.clone());
    }
    match index::recorded_source_dir(&config.persist_dir) {
        Some(dir) if dir.is_dir() => Ok(dir),
        _ => Ok(std::env::current_dir()?),
    }
}

/// Answer `query` from the persisted index, building one first if needed.
pub fn search(
    config: &Config,
    query: &str,
    options: QueryOptions,
) -> Result<Response> {
    let index = open_or_rebuild(config)?;
    let mut engine = index.query_engine(options);
    engine.query(query)
}
