use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand};
use ptf_core::ManagerConfig;
use ptf_sqlite::PartStore;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ptf-manager")]
#[command(about = "Import PTF part tables into SQLite and export them back", version)]
struct Cli {
    /// YAML file with defaults for every subcommand.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import every PTF file of a directory into the database.
    Import(ImportArgs),
    /// Export every table of the database to one PTF file.
    Export(ExportArgs),
    /// Show the tables stored in the database.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Database file path (default: part_table.db).
    #[arg(short = 'f', long)]
    db_file: Option<PathBuf>,
    /// Directory containing PTF files (default: current directory).
    #[arg(short = 'd', long)]
    ptf_dir: Option<PathBuf>,
    /// Also import PTF files from subdirectories.
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Database file path (default: part_table.db).
    #[arg(short = 'f', long)]
    db_file: Option<PathBuf>,
    /// Output PTF file (default: part_table.ptf).
    #[arg(short = 'p', long)]
    ptf_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Database file path (default: part_table.db).
    #[arg(short = 'f', long)]
    db_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Command::Import(args) => run_import(args, config),
        Command::Export(args) => run_export(args, config),
        Command::Status(args) => run_status(args, config),
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<ManagerConfig, String> {
    match path {
        Some(path) => ManagerConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display())),
        None => Ok(ManagerConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// import command
// ---------------------------------------------------------------------------

fn run_import(args: ImportArgs, config: ManagerConfig) -> Result<(), String> {
    let db_file = args.db_file.unwrap_or_else(|| config.db_file.clone());
    let ptf_dir = args.ptf_dir.unwrap_or_else(|| config.ptf_dir.clone());
    let recursive = args.recursive || config.recursive;

    let paths = collect_ptf_paths(&ptf_dir, recursive, &config)?;
    if paths.is_empty() {
        println!("No PTF files found in '{}'.", ptf_dir.display());
        return Ok(());
    }
    info!(files = paths.len(), db = %db_file.display(), "starting import");

    let mut store = PartStore::open(&db_file)
        .map_err(|e| format!("Failed to open database '{}': {e}", db_file.display()))?;

    let mut total = ptf_sqlite::ImportReport::default();
    let mut failed_files = 0usize;
    for path in &paths {
        let started = Instant::now();
        match store.import_file(path) {
            Ok(report) => {
                println!(
                    "Imported PTF file '{}' ({:.3}s)",
                    path.display(),
                    started.elapsed().as_secs_f64()
                );
                if !report.is_complete() {
                    failed_files += 1;
                    for failure in &report.failures {
                        eprintln!(
                            "  PART '{}' in '{}' failed: {}",
                            failure.part,
                            path.display(),
                            failure.message
                        );
                    }
                }
                total.merge(report);
            }
            Err(err) => {
                failed_files += 1;
                eprintln!("Failed to import PTF file '{}': {err}", path.display());
            }
        }
    }

    println!("Import complete:");
    println!("  Files: {}", paths.len());
    println!("  Parts imported: {}", total.parts_imported);
    println!("  Tables created: {}", total.tables_created);
    println!("  Tables migrated: {}", total.tables_migrated);
    println!("  Rows inserted: {}", total.rows_inserted);
    println!("  Rows ignored: {}", total.rows_ignored);

    if failed_files > 0 {
        return Err(format!("{failed_files} of {} file(s) failed to import", paths.len()));
    }
    Ok(())
}

/// Collects the PTF files under `dir`, sorted by path.
fn collect_ptf_paths(
    dir: &Path,
    recursive: bool,
    config: &ManagerConfig,
) -> Result<Vec<PathBuf>, String> {
    if !dir.is_dir() {
        return Err(format!("PTF directory '{}' does not exist", dir.display()));
    }

    let mut paths = BTreeSet::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current)
            .map_err(|e| format!("Failed to read directory '{}': {e}", current.display()))?;
        for entry in entries {
            let entry = entry
                .map_err(|e| format!("Failed to read directory '{}': {e}", current.display()))?;
            let path = entry.path();
            // Symlinked directories are not descended into.
            let file_type = entry
                .file_type()
                .map_err(|e| format!("Failed to inspect '{}': {e}", path.display()))?;
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if file_type.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "symlinked directory; skipping");
            } else if config.is_ptf_file(&path) {
                paths.insert(path);
            } else {
                debug!(path = %path.display(), "not a PTF file; skipping");
            }
        }
    }
    Ok(paths.into_iter().collect())
}

// ---------------------------------------------------------------------------
// export command
// ---------------------------------------------------------------------------

fn run_export(args: ExportArgs, config: ManagerConfig) -> Result<(), String> {
    let db_file = args.db_file.unwrap_or(config.db_file);
    let ptf_file = args.ptf_file.unwrap_or(config.ptf_file);

    let store = open_existing(&db_file)?;
    let started = Instant::now();
    let report = store
        .export_file(&ptf_file)
        .map_err(|e| format!("Failed to export to '{}': {e}", ptf_file.display()))?;

    println!(
        "Exported PTF file '{}' ({:.3}s)",
        ptf_file.display(),
        started.elapsed().as_secs_f64()
    );
    println!("  Tables exported: {}", report.tables_exported);
    println!("  Rows exported: {}", report.rows_exported);
    for table in &report.tables_skipped {
        eprintln!("  Skipped table '{table}': not representable as a PART");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status command
// ---------------------------------------------------------------------------

fn run_status(args: StatusArgs, config: ManagerConfig) -> Result<(), String> {
    let db_file = args.db_file.unwrap_or(config.db_file);
    let store = open_existing(&db_file)?;
    let status = store
        .status()
        .map_err(|e| format!("Failed to read status of '{}': {e}", db_file.display()))?;

    println!("Database '{}':", db_file.display());
    for table in &status.tables {
        println!(
            "  {}: {} rows, {} columns ({} primary)",
            table.name, table.rows, table.columns, table.primary_columns
        );
    }
    println!("  Tables: {}", status.tables.len());
    println!("  Total rows: {}", status.total_rows());
    Ok(())
}

/// Opens a database that must already exist.
fn open_existing(db_file: &Path) -> Result<PartStore, String> {
    if !db_file.is_file() {
        return Err(format!("Database file '{}' does not exist", db_file.display()));
    }
    PartStore::open(db_file)
        .map_err(|e| format!("Failed to open database '{}': {e}", db_file.display()))
}
