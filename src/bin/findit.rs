// FindIt CLI: a thin wrapper around the library's public `Engine` API.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use findit_engine::engine::SearchMode;
use findit_engine::query::SearchFilter;
use findit_engine::{init_engine, EngineConfig};

#[derive(Parser)]
#[command(name = "findit")]
#[command(about = "Semantic search over a personal video library", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine data directory (holds global.sqlite, vector indexes, config.toml)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the engine data directory and a default config.toml
    Init,

    /// Register a folder for watching and indexing
    AddFolder {
        /// Folder path to add
        path: PathBuf,
    },

    /// Unregister a folder
    RemoveFolder {
        /// Folder path to remove
        path: PathBuf,
    },

    /// List all registered folders
    Folders,

    /// Full rescan of one or all registered folders
    Scan {
        /// Folder to scan; all registered folders if omitted
        path: Option<PathBuf>,
    },

    /// Run a search
    Search {
        /// Query text
        query: String,
        /// "fts" for keyword-only, "auto" for the full hybrid fusion
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Maximum results to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Inspect or cancel in-flight indexing work
    Jobs {
        /// Cancel all in-flight and queued indexing work
        #[arg(long)]
        cancel: bool,
    },
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "findit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".findit-data"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Init => cmd_init(data_dir),
        Commands::AddFolder { path } => cmd_add_folder(data_dir, path).await,
        Commands::RemoveFolder { path } => cmd_remove_folder(data_dir, path).await,
        Commands::Folders => cmd_folders(data_dir).await,
        Commands::Scan { path } => cmd_scan(data_dir, path).await,
        Commands::Search { query, mode, limit } => cmd_search(data_dir, query, mode, limit).await,
        Commands::Jobs { cancel } => cmd_jobs(data_dir, cancel).await,
    }
}

fn cmd_init(data_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let config_path = data_dir.join("config.toml");
    if config_path.exists() {
        anyhow::bail!("engine already initialized at {}", data_dir.display());
    }
    let config = EngineConfig::default();
    std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;
    println!("Initialized FindIt engine at {}", data_dir.display());
    println!("  {}  - default config", config_path.display());
    println!("  global.sqlite      - global search projection (created on first use)");
    println!("  clip.usearch       - CLIP vector index (created on first rebuild)");
    println!("  text.usearch       - text embedding vector index (created on first rebuild)");
    Ok(())
}

async fn cmd_add_folder(data_dir: PathBuf, path: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;
    let path = path.canonicalize().unwrap_or(path);
    engine.add_folder(&path.to_string_lossy()).await?;
    println!("Added folder {}", path.display());
    Ok(())
}

async fn cmd_remove_folder(data_dir: PathBuf, path: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;
    engine.remove_folder(&path.to_string_lossy())?;
    println!("Removed folder {}", path.display());
    Ok(())
}

async fn cmd_folders(data_dir: PathBuf) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;
    let folders = engine.folders();
    if folders.is_empty() {
        println!("No folders registered. Use 'findit add-folder <path>' to add one.");
        return Ok(());
    }
    println!("{:>10}  {}", "available", "path");
    println!("{}", "-".repeat(60));
    for folder in folders {
        println!("{:>10}  {}", if folder.is_available { "yes" } else { "no" }, folder.folder_path);
    }
    Ok(())
}

async fn cmd_scan(data_dir: PathBuf, path: Option<PathBuf>) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;

    let targets: Vec<String> = match path {
        Some(p) => vec![p.to_string_lossy().to_string()],
        None => engine.folders().into_iter().map(|f| f.folder_path).collect(),
    };

    if targets.is_empty() {
        println!("No folders registered. Use 'findit add-folder <path>' to add one.");
        return Ok(());
    }

    for folder_path in targets {
        println!("Scanning {}...", folder_path);
        let outcome = engine.queue_folder(&folder_path, &[]).await?;
        println!(
            "  indexed: {}  skipped: {}  failed: {}",
            outcome.indexed, outcome.skipped, outcome.failed
        );
        if outcome.failed > 0 {
            for failure in engine.folder_failures(&folder_path) {
                println!("    ! {}  {}", failure.path, failure.message);
            }
        }
    }
    Ok(())
}

async fn cmd_search(data_dir: PathBuf, query: String, mode: String, limit: usize) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;

    let mode = match mode.as_str() {
        "fts" => SearchMode::Fts,
        _ => SearchMode::Auto,
    };

    let results = engine.search(&query, &SearchFilter::default(), mode).await?;
    if results.is_empty() {
        println!("No results for '{}'.", query);
        return Ok(());
    }

    for result in results.into_iter().take(limit) {
        let description = result.description.as_deref().unwrap_or("");
        println!(
            "{:>6.2}  {:>7.2}-{:<7.2}  {}  {}",
            result.score, result.start_time, result.end_time, result.file_path, description
        );
    }
    Ok(())
}

async fn cmd_jobs(data_dir: PathBuf, cancel: bool) -> Result<()> {
    let config = EngineConfig::load(&data_dir)?;
    let engine = init_engine(data_dir, config).await?;

    if cancel {
        engine.cancel_indexing().await;
        println!("Cancelled in-flight and queued indexing work.");
        return Ok(());
    }

    println!("Use --cancel to stop in-flight and queued indexing work.");
    Ok(())
}
