//! Command runners behind the `ragsync` binary.
//!
//! Each runner builds what it needs from [`Config`], does one thing, and
//! prints a human-readable summary to stdout. Progress and diagnostics go
//! through `tracing` to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::answer;
use crate::catalog::Catalog;
use crate::completion;
use crate::config::Config;
use crate::embedding;
use crate::models::RecordStatus;
use crate::store::{self, MetadataFilter};
use crate::sync::{SyncEngine, SyncPlan};

/// Create the catalog table and, for the SQLite backend, the index table.
pub async fn run_init(config: &Config) -> Result<()> {
    let catalog = Catalog::connect(config).await?;
    catalog.initialize().await?;
    catalog.close().await;

    let embedder = embedding::create_embedder(&config.embedding)?;
    store::connect(config, embedder)
        .await
        .context("Failed to open vector index")?;

    println!("Catalog initialized at {}", config.db.path.display());
    if config.index.backend == "sqlite" {
        println!("Vector index initialized at {}", config.index.path.display());
    }
    Ok(())
}

pub async fn run_sync(
    config: &Config,
    directory: Option<PathBuf>,
    full: bool,
    dry_run: bool,
) -> Result<()> {
    let directory = directory.unwrap_or_else(|| config.sync.root.clone());
    let mut engine = SyncEngine::from_config(config).await?;
    engine.options_mut().full = full;

    if dry_run {
        let plan = engine.plan(&directory).await?;
        print_plan(&directory, &plan);
        return Ok(());
    }

    let outcome = engine
        .sync(&directory)
        .await
        .with_context(|| format!("Sync of {} failed", directory.display()))?;
    let report = outcome.report;

    println!("sync {}", directory.display());
    if report.is_noop() {
        println!("  up to date");
        return Ok(());
    }
    println!("  added:    {}", report.added.len());
    println!("  modified: {}", report.modified.len());
    println!("  deleted:  {}", report.deleted.len());
    if !report.recovered.is_empty() {
        println!("  recovered: {}", report.recovered.join(", "));
    }
    println!("  chunks indexed: {}", report.chunks_indexed);
    println!("  chunks removed: {}", report.chunks_removed);
    Ok(())
}

fn print_plan(directory: &Path, plan: &SyncPlan) {
    println!("sync {} (dry run)", directory.display());
    if plan.is_empty() {
        println!("  up to date");
        return;
    }
    for entry in &plan.to_add {
        println!("  + {}", entry.source_id);
    }
    for entry in &plan.to_modify {
        if plan.recovered.contains(&entry.source_id) {
            println!("  ~ {} (recover)", entry.source_id);
        } else {
            println!("  ~ {}", entry.source_id);
        }
    }
    for id in &plan.to_delete {
        println!("  - {}", id);
    }
}

/// Ingest one file without touching the catalog.
pub async fn run_ingest(config: &Config, file: &Path, source_id: Option<&str>) -> Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    let n = engine.router().ingest(file, source_id).await?;
    println!(
        "ingested {} ({} chunks, source_id {})",
        file.display(),
        n,
        source_id.map(str::to_string).unwrap_or_else(|| file.display().to_string())
    );
    Ok(())
}

pub async fn run_forget(config: &Config, source_id: &str) -> Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    let (removed, existed) = engine.forget(source_id).await?;
    if !existed && removed == 0 {
        println!("{}: not indexed", source_id);
    } else {
        println!("forgot {} ({} chunks removed)", source_id, removed);
    }
    Ok(())
}

/// Print every catalog row with its status and chunk count.
pub async fn run_status(config: &Config) -> Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    engine.catalog().initialize().await?;
    let records = engine.catalog().list_records().await?;
    let total_chunks = engine.index().count(None).await?;

    println!("ragsync status");
    println!("==============");
    println!();
    println!("  Catalog:   {}", config.db.path.display());
    println!("  Index:     {} ({})", config.index.backend, config.index.collection);
    println!("  Files:     {}", records.len());
    println!("  Chunks:    {}", total_chunks);

    let pending = records
        .iter()
        .filter(|r| r.status == RecordStatus::Pending)
        .count();
    if pending > 0 {
        println!("  Pending:   {} (re-ingested on next sync)", pending);
    }

    if records.is_empty() {
        println!();
        return Ok(());
    }

    println!();
    println!(
        "  {:<40} {:<12} {:>7} {:<10} {}",
        "SOURCE_ID", "TYPE", "CHUNKS", "STATUS", "INDEXED"
    );
    println!("  {}", "-".repeat(88));
    for record in &records {
        let chunks = engine
            .index()
            .count(Some(&MetadataFilter::source_id(record.source_id.as_str())))
            .await?;
        println!(
            "  {:<40} {:<12} {:>7} {:<10} {}",
            record.source_id,
            record.file_type,
            chunks,
            record.status.as_str(),
            record.indexed_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    let k = k.unwrap_or(config.retrieval.k).max(1);
    let results = engine.index().similarity_search(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.metadata.source_id);
        if let Some(page) = result.metadata.page {
            println!("    page: {}", page);
        }
        if let Some(ref sheet) = result.metadata.sheet_name {
            println!("    sheet: {}", sheet);
        }
        let excerpt: String = result.content.chars().take(240).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    id: {}", result.id);
        println!();
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    let chat = completion::create_chat_model(&config.chat)?;
    let k = k.unwrap_or(config.retrieval.k).max(1);

    let answer =
        answer::answer_question(engine.index().as_ref(), chat.as_ref(), question, k).await?;

    println!("{}", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            let mut location = source.source_id.clone();
            if let Some(page) = source.page {
                location.push_str(&format!(" p.{}", page));
            }
            if let Some(ref sheet) = source.sheet_name {
                location.push_str(&format!(" [{}]", sheet));
            }
            println!("  - {} ({:.2})", location, source.score);
        }
    }
    Ok(())
}
