//! Fritzing editor backend CLI
//!
//! - `serve`: the HTTP API over the part catalog and saved projects
//! - `parts load`: one-shot descriptor ingestion into the catalog
//! - `parts parse`: print one `.fzp` descriptor as JSON

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use fritzing_catalog::Services;
use fritzing_ingest_fzp::{parse_descriptor_file, LoadSummary};
use fritzing_storage::{Database, StoreConfig};
use tracing_subscriber::EnvFilter;

mod server;

const DEFAULT_DB_NAME: &str = "fritzing_editor";
const DEFAULT_PARTS_DIR: &str = "/app/public/parts";

#[derive(Parser)]
#[command(name = "fritzing")]
#[command(author, version, about = "Fritzing circuit editor backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (`/api/parts`, `/api/projects`, `/api/health`).
    Serve(ServeArgs),

    /// Part catalog commands.
    Parts {
        #[command(subcommand)]
        command: PartsCommands,
    },
}

#[derive(Subcommand)]
enum PartsCommands {
    /// Load `<parts-dir>/core/*.fzp` into the catalog.
    Load {
        #[command(flatten)]
        store: StoreArgs,

        /// Root of the parts tree; descriptors are read from `<parts-dir>/core`.
        #[arg(long, env = "FRITZING_PARTS_DIR", default_value = DEFAULT_PARTS_DIR)]
        parts_dir: PathBuf,

        /// Replace existing parts with the same module id instead of skipping them.
        #[arg(long)]
        force_reload: bool,

        /// Print the load summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Parse one descriptor and print the extracted part as JSON.
    Parse {
        /// Input `.fzp` file
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct StoreArgs {
    /// Directory for collection journals. Without it the store is in-memory.
    #[arg(long, env = "FRITZING_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Database name (journal subdirectory).
    #[arg(long, env = "FRITZING_DB_NAME", default_value = DEFAULT_DB_NAME)]
    db_name: String,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.data_dir.clone(),
            db_name: self.db_name.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, env = "FRITZING_LISTEN", default_value = "0.0.0.0:8001")]
    listen: SocketAddr,

    #[command(flatten)]
    store: StoreArgs,

    /// Root of the parts tree served to the loader endpoint.
    #[arg(long, env = "FRITZING_PARTS_DIR", default_value = DEFAULT_PARTS_DIR)]
    parts_dir: PathBuf,

    /// If set, write a small JSON file once the server is listening.
    ///
    /// Useful for scripts/tests that bind `127.0.0.1:0`.
    #[arg(long)]
    ready_file: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so `parts parse` / `parts load --json` keep stdout clean.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Serve(args) => server::cmd_serve(args),
        Commands::Parts { command } => match command {
            PartsCommands::Load {
                store,
                parts_dir,
                force_reload,
                json,
            } => cmd_parts_load(&store, &parts_dir, force_reload, json),
            PartsCommands::Parse { file } => cmd_parts_parse(&file),
        },
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))
}

fn cmd_parts_load(store: &StoreArgs, parts_dir: &Path, force_reload: bool, json: bool) -> Result<()> {
    let config = store.config();
    if config.data_dir.is_none() {
        tracing::warn!("no --data-dir given; loaded parts will not outlive this process");
    }

    let summary = runtime()?.block_on(async {
        let db = Database::connect(&config)
            .with_context(|| format!("failed to open database `{}`", config.db_name))?;
        let services = Services::open(&db, parts_dir)?;
        let summary = services
            .parts
            .load_fritzing_parts(force_reload)
            .await
            .context("descriptor load failed")?;
        db.close().context("failed to close database")?;
        Ok::<_, anyhow::Error>(summary)
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&parts_dir.join("core"), &summary);
    }
    Ok(())
}

fn print_summary(dir: &Path, summary: &LoadSummary) {
    if summary.short_circuited {
        eprintln!(
            "{} catalog already holds {} parts; pass --force-reload to re-ingest",
            "skip".yellow().bold(),
            summary.parts_loaded
        );
        return;
    }
    eprintln!(
        "{} loaded {} parts from {}",
        "ok".green().bold(),
        summary.parts_loaded.to_string().bold(),
        dir.display()
    );
    eprintln!(
        "  inserted={} replaced={} skipped={} unparseable={} failed={}",
        summary.inserted, summary.replaced, summary.skipped, summary.unparseable, summary.failed
    );
}

fn cmd_parts_parse(file: &Path) -> Result<()> {
    let part = parse_descriptor_file(file)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&part)?);
    Ok(())
}
