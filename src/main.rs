//! # Notebook Automation CLI (`na`)
//!
//! The `na` binary keeps a course-notes vault organized: it fills in
//! hierarchy metadata, generates folder index documents, and runs PDFs and
//! lecture videos through the summarization pipeline.
//!
//! ## Usage
//!
//! ```bash
//! na --config ./config/na.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `na ensure-metadata <path>` | Reconcile hierarchy metadata for a note or a whole tree |
//! | `na generate-index <folder>` | Generate the folder's index document |
//! | `na process <pdf\|video> <path>` | Summarize source documents into notes |
//! | `na retry <failed-items.json>` | Reprocess the failed items of an earlier run |
//! | `na config` | Print the effective configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Preview which notes would get new metadata
//! na ensure-metadata ~/Vault/MBA --dry-run
//!
//! # Regenerate every index below a program folder
//! na generate-index ~/Vault/MBA --recursive
//!
//! # Summarize all lecture PDFs of a course, 8 at a time
//! na process pdf ~/Resources/MBA/Finance --concurrency 8
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use notebook_automation::commands::{self, BatchOptions};
use notebook_automation::config::{self, Config};
use notebook_automation::progress::QueueProgressMode;
use notebook_automation::queue::DocumentType;

/// Notebook Automation CLI: hierarchy metadata, folder indexes and
/// AI-summarized notes for a course vault.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/na.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "na",
    about = "Notebook Automation: keep a course-notes vault organized",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/na.toml`. May be absent when `--vault` is given.
    #[arg(long, global = true, default_value = "./config/na.toml")]
    config: PathBuf,

    /// Use this vault root instead of `[paths].vault_root`.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Log at debug level (overrides `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Reconcile hierarchy metadata (program/course/class/module).
    ///
    /// Accepts a single note or a folder; folders are walked recursively.
    /// Existing non-empty values are kept unless `--force` is given.
    EnsureMetadata {
        /// Note or folder inside the vault.
        path: PathBuf,

        /// Overwrite existing values that differ from the folder hierarchy.
        #[arg(long)]
        force: bool,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a folder's index document.
    GenerateIndex {
        /// Folder inside the vault.
        folder: PathBuf,

        /// Also generate the indexes of every folder below.
        #[arg(long, short)]
        recursive: bool,

        /// Overwrite hand-edited frontmatter values (read-only indexes are
        /// still skipped).
        #[arg(long)]
        force: bool,

        /// Report what would be written without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract, summarize and write notes for source documents.
    Process {
        /// Kind of source document.
        #[arg(value_enum)]
        kind: DocumentKind,

        /// A source file or a folder to scan.
        path: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Reprocess the items of a failed-items file.
    Retry {
        /// Failed-items JSON written by an earlier `process` run.
        failed_file: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Items processed in parallel (default: `[queue].concurrency`).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, value_enum)]
    progress: Option<ProgressArg>,

    /// Write the results and failed-items files here
    /// (default: `[queue].results_dir`).
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

impl BatchArgs {
    fn into_options(self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            progress: match self.progress {
                Some(ProgressArg::Off) => QueueProgressMode::Off,
                Some(ProgressArg::Human) => QueueProgressMode::Human,
                Some(ProgressArg::Json) => QueueProgressMode::Json,
                None => QueueProgressMode::default_for_tty(),
            },
            results_dir: self.results_dir,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DocumentKind {
    Pdf,
    Video,
}

impl From<DocumentKind> for DocumentType {
    fn from(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Pdf => DocumentType::Pdf,
            DocumentKind::Video => DocumentType::Video,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config file, or fall back to defaults when it is missing and a
/// `--vault` override supplies the only required setting.
fn load(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.vault {
        Some(vault) if !cli.config.exists() => Ok(Config::minimal(vault.clone())),
        _ => config::load_config(&cli.config),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load(&cli)?;
    let ctx = commands::vault_context(&cfg, cli.vault.as_deref())?;

    match cli.command {
        Commands::EnsureMetadata {
            path,
            force,
            dry_run,
        } => {
            commands::run_ensure_metadata(&cfg, &ctx, &path, force, dry_run).await?;
        }
        Commands::GenerateIndex {
            folder,
            recursive,
            force,
            dry_run,
        } => {
            commands::run_generate_index(&cfg, &ctx, &folder, recursive, force, dry_run).await?;
        }
        Commands::Process { kind, path, batch } => {
            commands::run_process(&cfg, &ctx, kind.into(), &path, batch.into_options()).await?;
        }
        Commands::Retry { failed_file, batch } => {
            commands::run_retry(&cfg, &ctx, &failed_file, batch.into_options()).await?;
        }
        Commands::Config => {
            commands::run_show_config(&cfg, &ctx);
        }
    }

    Ok(())
}
