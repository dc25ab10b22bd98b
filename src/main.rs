use clap::Parser;
use doc_search::{Config, cli::Cli, commands, error};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOC_SEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    // Before any environment lookup, logging included. Process variables
    // take precedence over the file.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = dotenv
        && !e.not_found()
    {
        tracing::warn!("ignoring unreadable .env file: {e}");
    }

    if let Some(shell) = cli.completions {
        doc_search::cli::print_completions(shell);
        return Ok(());
    }

    let config = Config::resolve(&cli.overrides())?;
    tracing::debug!(?config, "configuration resolved");

    if let Some(directory) = &cli.build {
        let index = commands::build(&config, directory)?;
        let manifest = index.manifest();
        println!(
            "Indexed {} document(s) ({} chunk(s)) from {} into {}",
            manifest.documents,
            manifest.chunks,
            manifest.source_dir.display(),
            index.root().display()
        );
        return Ok(());
    }

    let response =
        commands::search(&config, &cli.query, cli.query_options())?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{response}");
    }

    Ok(())
}
