//! One-shot command line front end over the document pipeline.
//!
//! `ingest` stores documents, `ask` answers a question (over the whole store, or per document
//! when files are given), and `themes` extracts themes across a set of files. Results are printed
//! as JSON on stdout.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docsift::{
    config,
    extraction::DocumentKind,
    logging::{self, ConsoleTarget},
    pipeline::{DocumentPipeline, PipelineApi},
};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docsift-cli",
    about = "Ingest documents, ask questions, and extract themes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and store files; directories are walked recursively.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the stored documents.
    Ask {
        query: String,
        /// Answer once per listed file instead of searching the store.
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },
    /// Identify themes across the given files.
    Themes {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing_with(ConsoleTarget::Stderr);
    let config = config::init_config().context("failed to load configuration")?;
    let pipeline = DocumentPipeline::from_config(config)
        .await
        .context("failed to open the embedding store")?;

    match cli.command {
        Command::Ingest { paths } => {
            let files = collect_files(&paths)?;
            let session = pipeline.create_session().await;
            let outcome = pipeline.ingest_files(&session, files).await?;
            print_json(&outcome)
        }
        Command::Ask { query, files } if files.is_empty() => {
            let answer = pipeline.answer_query(&query).await?;
            print_json(&answer)
        }
        Command::Ask { query, files } => {
            let files = collect_files(&files)?;
            let session = pipeline.create_session().await;
            pipeline.ingest_files(&session, files).await?;
            let answers = pipeline.answer_per_document(&session, &query).await?;
            print_json(&answers)
        }
        Command::Themes { paths } => {
            let files = collect_files(&paths)?;
            let session = pipeline.create_session().await;
            pipeline.ingest_files(&session, files).await?;
            let themes = pipeline.identify_themes(&session).await?;
            print_json(&themes)
        }
    }
}

/// Expand directories into the supported files they contain, sorted by path.
fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            {
                files.push(entry.into_path());
            }
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("no such file or directory: {}", input.display());
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        bail!("no supported documents found");
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
