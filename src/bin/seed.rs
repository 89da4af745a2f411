//! Seed the document store from a local directory.
//!
//! Every regular file is uploaded under its file name. By default files go through the full
//! upload pipeline (store, summarize, index); `--store-only` writes straight to the object store.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use pbs_rag::{config, logging, pipeline::RagPipeline};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "pbs-seed", about = "Upload a directory of sample documents")]
struct Cli {
    /// Directory holding the documents to upload.
    #[arg(long, default_value = "./sample_docs")]
    dir: PathBuf,
    /// Descend into subdirectories; keys stay the bare file name.
    #[arg(long)]
    recursive: bool,
    /// Skip summarization and indexing.
    #[arg(long)]
    store_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;

    if !cli.dir.is_dir() {
        bail!("{} is not a directory", cli.dir.display());
    }

    let pipeline = RagPipeline::from_config(config)
        .await
        .context("Failed to build pipeline")?;
    if !cli.store_only
        && let Err(error) = pipeline.index().ensure_ready().await
    {
        tracing::warn!(error = %error, "Vector index not ready; documents will be stored only");
    }

    let files = collect_files(&cli.dir, cli.recursive)?;
    let mut failures = 0usize;
    for (filename, path) in &files {
        tracing::info!(filename = %filename, "Uploading");
        match seed_file(&pipeline, filename, path, cli.store_only).await {
            Ok(detail) => tracing::info!(filename = %filename, detail = %detail, "Uploaded"),
            Err(error) => {
                failures += 1;
                tracing::error!(filename = %filename, error = ?error, "Upload failed");
            }
        }
    }

    tracing::info!(total = files.len(), failures, "Seeding finished");
    if failures > 0 {
        bail!("{failures} of {} uploads failed", files.len());
    }
    Ok(())
}

fn collect_files(dir: &Path, recursive: bool) -> Result<Vec<(String, PathBuf)>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        files.push((filename, entry.into_path()));
    }
    Ok(files)
}

async fn seed_file(
    pipeline: &RagPipeline,
    filename: &str,
    path: &Path,
    store_only: bool,
) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if store_only {
        pipeline.store().put(filename, bytes).await?;
        return Ok("stored".to_string());
    }

    let outcome = pipeline.upload(filename, bytes).await?;
    Ok(format!("{}: {}", outcome.message(), outcome.summary))
}
