//! Command runners behind the `na` binary.
//!
//! Each `run_*` function wires the library services together for one CLI
//! command and prints a plain-text report on stdout. Logs and progress go
//! to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::extract::FileExtractor;
use crate::frontmatter::{FrontmatterStore, MetadataStore};
use crate::index::{IndexGenerator, IndexOutcome};
use crate::metadata::{MetadataService, PathLocks};
use crate::progress::{self, QueueProgressMode};
use crate::queue::{BatchProcessResult, Collaborators, DocumentType, ProcessingQueue, QueueItem};
use crate::scan;
use crate::share;
use crate::summarize;
use crate::vault::VaultContext;

/// File names written into the results directory.
pub const RESULTS_FILE: &str = "queue-results.json";
pub const FAILED_ITEMS_FILE: &str = "failed-items.json";

/// Vault context for a run, with both roots made absolute.
pub fn vault_context(config: &Config, vault_override: Option<&Path>) -> Result<VaultContext> {
    let vault_root = vault_override.unwrap_or(&config.paths.vault_root);
    let vault_root = std::path::absolute(vault_root)
        .with_context(|| format!("Invalid vault root: {}", vault_root.display()))?;
    let mut ctx = config.vault_context().with_vault_root(vault_root);
    if let Some(resources) = &config.paths.resources_root {
        let resources = std::path::absolute(resources)
            .with_context(|| format!("Invalid resources root: {}", resources.display()))?;
        ctx = ctx.with_resources_root(resources);
    }
    Ok(ctx)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

fn store() -> Arc<dyn MetadataStore> {
    Arc::new(FrontmatterStore::new())
}

pub async fn run_ensure_metadata(
    config: &Config,
    ctx: &VaultContext,
    path: &Path,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let path = absolute(path)?;
    let service = MetadataService::new(store(), PathLocks::new());
    let verb = if dry_run { "Would update" } else { "Updated" };

    if path.is_file() {
        let changed = service.ensure_metadata(ctx, &path, force, dry_run).await?;
        if changed {
            println!("{}: {}", verb, path.display());
        } else {
            println!("Unchanged: {}", path.display());
        }
        return Ok(());
    }

    let stats = service
        .ensure_metadata_tree(ctx, &path, &config.filesystem, force, dry_run)
        .await?;
    println!("Metadata pass{}", if dry_run { " (dry run)" } else { "" });
    println!("  scanned:   {}", stats.scanned);
    println!("  {}:   {}", if dry_run { "to update" } else { "updated" }, stats.changed);
    println!("  unchanged: {}", stats.unchanged);
    println!("  failed:    {}", stats.failed);
    for (failed, message) in &stats.failures {
        println!("    {}: {}", failed.display(), message);
    }
    Ok(())
}

pub async fn run_generate_index(
    config: &Config,
    ctx: &VaultContext,
    folder: &Path,
    recursive: bool,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let folder = absolute(folder)?;
    let generator = IndexGenerator::new(store(), PathLocks::new());

    if !recursive {
        let outcome = generator
            .generate_index_outcome(ctx, &folder, force, dry_run)
            .await?;
        let label = match (outcome, dry_run) {
            (IndexOutcome::Written, true) => "Would write index",
            (IndexOutcome::Written, false) => "Wrote index",
            (IndexOutcome::Unchanged, _) => "Index unchanged",
            (IndexOutcome::ReadOnly, _) => "Index is read-only, skipped",
        };
        println!("{}: {}", label, folder.display());
        return Ok(());
    }

    let stats = generator
        .generate_below(ctx, &folder, &config.filesystem, force, dry_run)
        .await?;
    println!("Index pass{}", if dry_run { " (dry run)" } else { "" });
    println!("  generated: {}", stats.generated);
    println!("  unchanged: {}", stats.unchanged);
    println!("  read-only: {}", stats.skipped_read_only);
    println!("  failed:    {}", stats.failed);
    for (failed, message) in &stats.failures {
        println!("    {}: {}", failed.display(), message);
    }
    Ok(())
}

/// Options shared by `process` and `retry`.
pub struct BatchOptions {
    pub concurrency: Option<usize>,
    pub progress: QueueProgressMode,
    pub results_dir: Option<PathBuf>,
}

fn build_queue(config: &Config, ctx: &VaultContext) -> Result<ProcessingQueue> {
    let summarizer = summarize::create_summarizer(&config.ai)?;
    let collaborators = Collaborators {
        extractor: Arc::new(FileExtractor::new()),
        summarizer: Arc::from(summarizer),
        share_links: share::create_share_link_provider(&config.sharing).map(Arc::from),
        store: store(),
    };
    Ok(ProcessingQueue::new(
        ctx.clone(),
        collaborators,
        config.chunking.clone(),
        config.queue.overwrite_notes,
        PathLocks::new(),
    ))
}

pub async fn run_process(
    config: &Config,
    ctx: &VaultContext,
    document_type: DocumentType,
    path: &Path,
    options: BatchOptions,
) -> Result<()> {
    let path = absolute(path)?;
    let sources = scan::scan_sources(
        &path,
        document_type.extensions(),
        config.filesystem.follow_symlinks,
    )?;
    if sources.is_empty() {
        println!("No {} files found under {}", document_type, path.display());
        return Ok(());
    }

    let queue = build_queue(config, ctx)?;
    for source in sources {
        queue.enqueue(source, document_type);
    }
    let items = queue.take_pending();
    run_and_report(config, queue, items, options).await
}

pub async fn run_retry(
    config: &Config,
    ctx: &VaultContext,
    failed_file: &Path,
    options: BatchOptions,
) -> Result<()> {
    let items = ProcessingQueue::load_failed_items(failed_file)?;
    if items.is_empty() {
        println!("Nothing to retry in {}", failed_file.display());
        return Ok(());
    }
    println!("Retrying {} failed items from {}", items.len(), failed_file.display());
    let queue = build_queue(config, ctx)?;
    run_and_report(config, queue, items, options).await
}

async fn run_and_report(
    config: &Config,
    queue: ProcessingQueue,
    items: Vec<QueueItem>,
    options: BatchOptions,
) -> Result<()> {
    let concurrency = options.concurrency.unwrap_or(config.queue.concurrency);
    if concurrency == 0 {
        bail!("--concurrency must be >= 1");
    }

    let reporter = progress::spawn_reporter(queue.subscribe(), options.progress.reporter());
    let cancel = queue.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight stages");
            cancel.cancel();
        }
    });

    let result = queue.run_batch(items, concurrency).await?;
    ctrl_c.abort();

    let results_dir = options.results_dir.or_else(|| config.queue.results_dir.clone());
    if let Some(dir) = &results_dir {
        queue.write_results(&result, &dir.join(RESULTS_FILE))?;
        queue.write_failed_items(&dir.join(FAILED_ITEMS_FILE))?;
    }
    let failed = queue.failed_items();
    drop(queue);
    let _ = reporter.await;

    print_batch_report(&result, &failed);
    if let Some(dir) = &results_dir {
        println!("Results written to {}", dir.join(RESULTS_FILE).display());
        if !failed.is_empty() {
            println!(
                "Retry with: na retry {}",
                dir.join(FAILED_ITEMS_FILE).display()
            );
        }
    }
    Ok(())
}

fn print_batch_report(result: &BatchProcessResult, failed: &[QueueItem]) {
    println!("{}", result.summary());
    if !failed.is_empty() {
        println!("Failed:");
        for item in failed {
            println!("  {}: {}", item.file_path.display(), item.status_message);
        }
    }
}

/// Print the effective configuration.
pub fn run_show_config(config: &Config, ctx: &VaultContext) {
    println!("vault_root:       {}", ctx.vault_root().display());
    match ctx.resources_root() {
        Some(resources) => println!("resources_root:   {}", resources.display()),
        None => println!("resources_root:   (none)"),
    }
    println!(
        "chunking:         chunk_size={} overlap={} max_single_pass_tokens={}",
        config.chunking.chunk_size, config.chunking.overlap, config.chunking.max_single_pass_tokens
    );
    println!(
        "queue:            concurrency={} overwrite_notes={}",
        config.queue.concurrency, config.queue.overwrite_notes
    );
    println!(
        "ai:               provider={} model={}",
        config.ai.provider,
        config.ai.model.as_deref().unwrap_or("-")
    );
    println!("sharing:          provider={}", config.sharing.provider);
    println!(
        "filesystem:       include={:?} exclude={:?}",
        config.filesystem.include_globs, config.filesystem.exclude_globs
    );
}
