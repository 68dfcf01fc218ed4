//! passage-probe
//!
//! Index a directory into passages and query it with hybrid BM25 + embedding
//! search, either once (`--query`) or from an interactive prompt.

mod output;
mod progress;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use passage_probe_core::{join_indexing, EmbeddingService, IndexReport, Session, SessionError, Settings};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::progress::ProgressMode;

const PROMPT: &str = "Query (blank to quit) > ";

/// passage-probe - hybrid passage search over a directory
#[derive(Parser, Debug)]
#[command(name = "passage-probe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index a directory into passages and query it with hybrid BM25 + embedding search")]
struct Cli {
    /// Settings file (defaults to $PASSAGE_PROBE_CONFIG or ./settings.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delete the store and index everything again
    #[arg(long)]
    reindex: bool,

    /// Skip indexing and only query the existing store
    #[arg(long)]
    no_index: bool,

    /// Run a single query and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Retrieval mode
    #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
    mode: Mode,

    /// Override the configured number of results
    #[arg(long)]
    top_k: Option<usize>,

    /// Index on a worker and start answering queries immediately
    #[arg(long)]
    background: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// RRF fusion of vector and BM25 rankings, one passage per document
    Hybrid,
    /// Vector similarity only, every passage
    Semantic,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if cli.reindex && cli.no_index {
        fail("--reindex and --no-index cannot be used together");
    }

    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("loading settings from {}", config_path.display()))?;
    if let Some(top_k) = cli.top_k {
        settings.index.top_k = top_k;
    }

    if !settings.paths.root_dir.is_dir() {
        fail(format!(
            "root directory does not exist: {}",
            settings.paths.root_dir.display()
        ));
    }

    let embedder = Arc::new(
        EmbeddingService::from_config(&settings.model).context("configuring embedding model")?,
    );
    // Model and store problems are fatal before any indexing starts
    let opened = if cli.reindex {
        Session::open_fresh(settings, embedder)
    } else {
        Session::open(settings, embedder)
    };
    let session = opened.unwrap_or_else(|e| fail(e));

    let mut background: Option<JoinHandle<Result<IndexReport, SessionError>>> = None;
    if !cli.no_index {
        let (handle, rx) = session.spawn_indexing()?;
        if cli.background {
            tokio::spawn(progress::report(rx, ProgressMode::Quiet));
            background = Some(handle);
        } else {
            progress::report(rx, ProgressMode::Bar).await;
            let report = join_indexing(handle).await?;
            tracing::info!("{}", progress::summary(&report));
        }
    }

    let stats = session.stats()?;
    tracing::info!(
        "Store has {} documents, {} passages, {} embeddings",
        stats.documents,
        stats.passages,
        stats.embeddings
    );

    match &cli.query {
        Some(query) => run_query(&session, &cli, query)?,
        None => {
            if !cli.json {
                println!("{}", output::render_stats(&stats));
            }
            interactive(&session, &cli)?;
        }
    }

    if let Some(handle) = background {
        if !handle.is_finished() {
            eprintln!("{}", "Waiting for background indexing to finish...".dimmed());
        }
        let report = join_indexing(handle).await?;
        tracing::info!("{}", progress::summary(&report));
    }

    Ok(())
}

fn interactive(session: &Session, cli: &Cli) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("{}", PROMPT.cyan().bold());
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            break;
        }

        // A failed query should not end the session
        if let Err(e) = run_query(session, cli, query) {
            eprintln!("{} {:#}", "error:".red().bold(), e);
        }
    }

    Ok(())
}

fn run_query(session: &Session, cli: &Cli, query: &str) -> anyhow::Result<()> {
    let rendered = match cli.mode {
        Mode::Hybrid => {
            let hits = session.search(query)?;
            if cli.json {
                output::render_json(query, "hybrid", &hits)?
            } else {
                output::render_hybrid(&hits)
            }
        }
        Mode::Semantic => {
            let hits = session.semantic_search(query)?;
            if cli.json {
                output::render_json(query, "semantic", &hits)?
            } else {
                output::render_semantic(&hits)
            }
        }
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
