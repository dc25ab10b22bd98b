use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("tensor computation error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("manifest error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {}", path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Why a persisted index could not be reopened.
///
/// The kind decides whether the caller should fall back to a fresh build.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no index found at {}", .0.display())]
    Missing(PathBuf),

    #[error("index at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error(
        "index at {} has format version {found}, expected {expected}",
        path.display()
    )]
    Incompatible {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("cannot read index at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Whether building a new index is a sensible response to this failure.
    ///
    /// Missing, corrupt and outdated storage can be replaced. Anything else
    /// (permissions, a full disk) would fail the rebuild too, so it is
    /// reported instead.
    pub fn should_rebuild(&self) -> bool {
        match self {
            LoadError::Missing(_)
            | LoadError::Corrupt { .. }
            | LoadError::Incompatible { .. } => true,
            LoadError::Io { .. } => false,
        }
    }

    pub(crate) fn corrupt(path: &std::path::Path, reason: impl ToString) -> Self {
        LoadError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
