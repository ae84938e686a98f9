use clap::{Parser, Subcommand};
use edk2_index::logging::{LogConfig, init_logging};
use edk2_index::{IndexConfig, WorkspaceIndex};
use serde::Serialize;
use std::path::{PathBuf, absolute};
use tracing::{info, warn};

/// CLI arguments for the EDK2 workspace indexer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root to scan (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides EDK2_INDEX_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Additional directory names to skip during discovery
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Follow symbolic links while walking the workspace
    #[arg(long)]
    follow_symlinks: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the workspace and print totals
    Scan,
    /// Include directories for a source file
    Includes { file: PathBuf },
    /// Modules that list a source file
    Modules { file: PathBuf },
    /// Known implementations of a library class
    Library { class_name: String },
    /// Diagnostics reported for a platform or included file
    Diagnostics { file: PathBuf },
    /// Reduced view of a platform description
    Platform { dsc: PathBuf },
    /// Packages found in the workspace
    Packages,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level, args.log_file);
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let root = match args.root {
        Some(root) => absolute(&root)?,
        None => std::env::current_dir()?,
    };
    let config = IndexConfig::from_env().with_overrides(args.exclude, args.follow_symlinks);
    let index = WorkspaceIndex::new(root, config);

    let summary = index.scan().await?;
    info!(
        "Indexed {} modules, {} packages and {} platforms in {}ms",
        summary.modules, summary.packages, summary.platforms, summary.duration_ms
    );
    if summary.failed > 0 {
        warn!("{} files could not be indexed", summary.failed);
    }

    match args.command {
        Command::Scan => print_json(&summary)?,
        Command::Includes { file } => {
            print_json(&index.include_paths_for(&absolute(&file)?).await)?
        }
        Command::Modules { file } => {
            print_json(&index.modules_for_source(&absolute(&file)?).await)?
        }
        Command::Library { class_name } => {
            print_json(&index.library_implementations(&class_name).await)?
        }
        Command::Diagnostics { file } => print_json(&index.diagnostics(&absolute(&file)?).await)?,
        Command::Platform { dsc } => match index.platform(&absolute(&dsc)?).await {
            Some(platform) => print_json(&platform)?,
            None => {
                eprintln!("No platform indexed at {}", dsc.display());
                std::process::exit(2);
            }
        },
        Command::Packages => print_json(&index.packages().await)?,
    }

    Ok(())
}
