use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    doc_id::DocumentId,
    error::Result,
    walker::{self, DiscoveredFile, Excludes},
};

/// A source document read into memory for indexing.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub relative_path: String,
    pub title: String,
    pub content: String,
    pub mtime: u64,
}

/// Every readable document under one directory.
#[derive(Debug, Clone)]
pub struct DocumentSet {
    root: PathBuf,
    documents: Vec<Document>,
}

impl DocumentSet {
    /// Recursively load all supported documents under `root`.
    ///
    /// Fails if `root` is missing or not a directory. Individual files that
    /// cannot be read as UTF-8 text are skipped with a warning.
    pub fn load(root: &Path, excludes: &Excludes) -> Result<Self> {
        let files = walker::discover_files(root, excludes)?;
        tracing::debug!(count = files.len(), "discovered files");

        let documents: Vec<Document> =
            files.par_iter().filter_map(read_document).collect();

        let skipped = files.len() - documents.len();
        if skipped > 0 {
            tracing::warn!(skipped, "some files could not be read");
        }

        Ok(Self {
            root: root.canonicalize()?,
            documents,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn read_document(file: &DiscoveredFile) -> Option<Document> {
    let content = match std::fs::read_to_string(&file.absolute_path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %file.absolute_path.display(),
                "skipping unreadable file: {e}"
            );
            return None;
        }
    };

    let relative_path = file.relative_path.to_string_lossy().to_string();
    Some(Document {
        id: DocumentId::new(&relative_path),
        title: extract_title(&content, &file.relative_path),
        relative_path,
        content,
        mtime: file.mtime,
    })
}

/// Extract a title from file content.
///
/// Looks for the first markdown heading (line starting with `# `).
/// Falls back to the filename without extension.
fn extract_title(content: &str, file_path: &Path) -> String {
    for line in content.lines() {
        if let Some(heading) = line.trim().strip_prefix("# ") {
            let title = heading.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}
