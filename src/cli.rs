use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::{
    config::Overrides,
    query::{DEFAULT_COUNT, QueryOptions},
};

#[derive(Debug, Parser)]
#[command(
    name = "doc-search",
    version,
    about = "Index a directory of documents and search it from the command line"
)]
pub struct Cli {
    /// Build a new index from this directory instead of querying
    #[arg(long, value_name = "DIRECTORY")]
    pub build: Option<PathBuf>,

    /// Text to search for
    #[arg(default_value = "")]
    pub query: String,

    /// Where the index is stored [env: PERSIST_DIR]
    #[arg(long, value_name = "DIR")]
    pub persist_dir: Option<PathBuf>,

    /// Directory indexed when no usable index exists [env: DOC_SEARCH_SOURCE_DIR]
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,

    /// ColBERT model ID or local model path [env: DOC_SEARCH_MODEL]
    #[arg(long)]
    pub model: Option<String>,

    /// Build a keyword-only index without ColBERT embeddings
    #[arg(long)]
    pub no_embeddings: bool,

    /// Skip the ColBERT stage at query time
    #[arg(long)]
    pub bm25_only: bool,

    /// Number of results to show
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT)]
    pub count: usize,

    /// Glob of relative paths to leave out of the index (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL", hide = true)]
    pub completions: Option<Shell>,
}

impl Cli {
    /// Settings given on the command line, to be merged with the
    /// environment.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            persist_dir: self.persist_dir.clone(),
            source_dir: self.source_dir.clone(),
            model: self.model.clone(),
            no_embeddings: self.no_embeddings,
            excludes: self.exclude.clone(),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            count: self.count,
            bm25_only: self.bm25_only,
            ..QueryOptions::default()
        }
    }
}

/// Generate shell completions and print to stdout.
pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "doc-search", &mut std::io::stdout());
}
