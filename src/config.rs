use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    model_manager::DEFAULT_MODEL_ID,
};

pub const PERSIST_DIR_ENV: &str = "PERSIST_DIR";
pub const SOURCE_DIR_ENV: &str = "DOC_SEARCH_SOURCE_DIR";
pub const MODEL_ENV: &str = "DOC_SEARCH_MODEL";

/// Storage location used when neither `--persist-dir` nor `PERSIST_DIR` is set.
pub const DEFAULT_PERSIST_DIR: &str = "~/.doc-search/storage";

/// Values given explicitly on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub persist_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub no_embeddings: bool,
    pub excludes: Vec<String>,
}

/// Settings for one invocation, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the index is read from and written to.
    pub persist_dir: PathBuf,
    /// Documents indexed when a query finds no usable index. When unset,
    /// the directory recorded by the previous index or the working
    /// directory is used instead.
    pub source_dir: Option<PathBuf>,
    /// ColBERT model ID (HuggingFace) or local model directory.
    pub model_id: String,
    /// Compute ColBERT embeddings at build time.
    pub embeddings: bool,
    /// Glob patterns of relative paths to leave out of the index.
    pub excludes: Vec<String>,
}

impl Config {
    /// Resolve the configuration from the process environment.
    ///
    /// Expects any `.env` file to have been loaded into the environment
    /// already (see the binary's startup).
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let home = dirs::home_dir();
        Self::from_sources(
            overrides,
            |key| std::env::var(key).ok(),
            home.as_deref(),
        )
    }

    /// Resolve each setting, in order of priority:
    /// 1. The explicit command-line value
    /// 2. The environment variable (`PERSIST_DIR`, `DOC_SEARCH_SOURCE_DIR`,
    ///    `DOC_SEARCH_MODEL`)
    /// 3. The built-in default
    ///
    /// A leading `~` in any path is expanded against `home`, and relative
    /// paths are made absolute against the working directory.
    pub fn from_sources(
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
        home: Option<&Path>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let persist_dir = match (&overrides.persist_dir, env(PERSIST_DIR_ENV)) {
            (Some(path), _) => expand_home(path, home)?,
            (None, Some(val)) => expand_home(Path::new(&val), home)?,
            (None, None) => expand_home(Path::new(DEFAULT_PERSIST_DIR), home)?,
        };

        let source_dir = match (&overrides.source_dir, env(SOURCE_DIR_ENV)) {
            (Some(path), _) => Some(expand_home(path, home)?),
            (None, Some(val)) => Some(expand_home(Path::new(&val), home)?),
            (None, None) => None,
        };

        let model_id = overrides
            .model
            .clone()
            .or_else(|| env(MODEL_ENV))
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Ok(Self {
            persist_dir: std::path::absolute(persist_dir)?,
            source_dir: source_dir.map(std::path::absolute).transpose()?,
            model_id,
            embeddings: !overrides.no_embeddings,
            excludes: overrides.excludes.clone(),
        })
    }
}

/// Replace a leading `~` with the user's home directory.
fn expand_home(path: &Path, home: Option<&Path>) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };

    let home = home.ok_or_else(|| {
        Error::Config(format!(
            "cannot expand {}: home directory is unknown",
            path.display()
        ))
    })?;

    Ok(home.join(rest))
}
