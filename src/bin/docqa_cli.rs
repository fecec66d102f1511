//! Command-line front end for the document service.
//!
//! `chunks` and `purge` work on the local artifact directory only; the other commands build the
//! full service and therefore need a reachable Qdrant plus the configured model providers.
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docqa::config::{self, Config};
use docqa::ingestion::{DocumentIngestion, FileHandlerConfig, FileStore, UploadedFile};
use docqa::logging;
use docqa::pipeline::{DocumentApi, DocumentService};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docqa-cli",
    about = "Ingest, query and summarize documents from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preview the chunks produced for files or directories without indexing them.
    Chunks {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Store, chunk and index files into the configured collection.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the indexed documents.
    Ask { question: String },
    /// Summarize each file.
    Summarize {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Classify the sentiment of a text.
    Sentiment { text: String },
    /// Remove every stored run under the artifact directory.
    Purge,
}

#[derive(Serialize)]
struct ChunkPreview<'a> {
    file: &'a str,
    category: String,
    chunks: Vec<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    let config = config::get_config();
    logging::init_tracing(&config.artifact_dir);

    match cli.command {
        Command::Chunks { paths } => preview_chunks(config, &paths).await,
        Command::Ingest { paths } => {
            let files = read_uploads(&paths)?;
            let outcome = service(config).await?.process_documents(files).await?;
            print_json(&outcome)
        }
        Command::Ask { question } => {
            let answer = service(config).await?.answer_question(&question).await?;
            println!("{answer}");
            Ok(())
        }
        Command::Summarize { paths } => {
            let files = read_uploads(&paths)?;
            let summaries = service(config).await?.summarize_documents(files).await?;
            print_json(&summaries)
        }
        Command::Sentiment { text } => {
            let sentiment = service(config).await?.analyze_sentiment(&text).await?;
            println!("{sentiment}");
            Ok(())
        }
        Command::Purge => {
            let removed = FileStore::new(FileHandlerConfig::from_config(config))
                .purge()
                .await
                .context("failed to purge artifacts")?;
            println!("Removed {removed} run(s) from {}", config.artifact_dir.display());
            Ok(())
        }
    }
}

async fn service(config: &Config) -> Result<DocumentService> {
    DocumentService::new(config.clone())
        .await
        .context("failed to initialize document service")
}

/// Transform into a throwaway run, print the chunks, then remove the run.
async fn preview_chunks(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let files = read_uploads(paths)?;
    let ingestion = DocumentIngestion::from_config(config).context("invalid splitter settings")?;
    let (artifact, named) = ingestion.ingest_named(&files).await?;
    ingestion
        .file_store()
        .cleanup(&artifact)
        .await
        .context("failed to remove preview run")?;

    let previews: Vec<ChunkPreview<'_>> = named
        .documents
        .iter()
        .map(|(name, document)| ChunkPreview {
            file: name,
            category: document.category.to_string(),
            chunks: document.chunks.iter().map(|chunk| chunk.text.as_str()).collect(),
        })
        .collect();
    print_json(&previews)
}

/// Read every file named directly or found under a directory.
fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(read_upload(entry.path())?);
                }
            }
        } else {
            files.push(read_upload(path)?);
        }
    }
    if files.is_empty() {
        bail!("No files provided");
    }
    Ok(files)
}

fn read_upload(path: &Path) -> Result<UploadedFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(UploadedFile::new(name, bytes))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
