use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use md5::{Digest, Md5};

use csn_core::config;
use csn_core::detector::verify_piece;
use csn_core::storage::{DiskStore, StorageEngine};

/// Operator CLI over the local seed cache: inspect, verify and repair the
/// per-task artifacts without going through the serving process.
#[derive(Debug, Parser)]
#[command(name = "csn")]
#[command(about = "CSN: seed-node cache inspection tool", long_about = None)]
pub struct Cli {
    /// Storage root to operate on (defaults to the configured root).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List tasks present in the store.
    List,

    /// Show a task's metadata record and journal summary.
    Show {
        /// Task identifier.
        task_id: String,
    },

    /// Re-hash a task's data blob against its piece journal.
    Verify {
        /// Task identifier.
        task_id: String,
    },

    /// Remove all artifacts for a task.
    Remove {
        /// Task identifier.
        task_id: String,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                cfg.storage_root()?
            }
        };
        run(cli.command, &root)
    }
}

pub fn run(command: CliCommand, root: &std::path::Path) -> Result<()> {
    let store = DiskStore::open(root).context("open storage root")?;
    match command {
        CliCommand::List => {
            let ids = store.list_task_ids()?;
            if ids.is_empty() {
                println!("No tasks in store.");
                return Ok(());
            }
            println!("{:<34} {:<8} {:<12} URL", "TASK", "FINISH", "LENGTH");
            for id in ids {
                match store.read_file_metadata(&id) {
                    Ok(meta) => println!(
                        "{:<34} {:<8} {:<12} {}",
                        id, meta.finish, meta.cdn_file_length, meta.task_url
                    ),
                    Err(e) => println!("{:<34} (unreadable metadata: {})", id, e),
                }
            }
        }
        CliCommand::Show { task_id } => {
            let meta = store
                .read_file_metadata(&task_id)
                .with_context(|| format!("read metadata for {}", task_id))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            let records = store.read_piece_meta_records(&task_id)?;
            println!("journal: {} piece(s)", records.len());
            for r in &records {
                println!(
                    "  piece {:<4} origin {:<16} len {:<8} md5 {}",
                    r.piece_num,
                    r.origin_range.to_string(),
                    r.piece_len,
                    r.md5
                );
            }
        }
        CliCommand::Verify { task_id } => {
            let records = store.read_piece_meta_records(&task_id)?;
            if records.is_empty() {
                println!("Task {} has no journal to verify.", task_id);
                return Ok(());
            }
            let mut reader = store
                .read_download_file(&task_id)
                .with_context(|| format!("open data blob for {}", task_id))?;
            let mut file_hasher = Md5::new();
            let mut verified = 0usize;
            for record in &records {
                if let Err(err) = verify_piece(&mut reader, record, &mut file_hasher) {
                    println!(
                        "Piece {} failed after {} verified piece(s): {}",
                        record.piece_num, verified, err
                    );
                    return Ok(());
                }
                verified += 1;
            }
            println!(
                "All {} piece(s) verified, file digest so far: {}",
                verified,
                csn_core::digest::hex_digest(file_hasher)
            );
        }
        CliCommand::Remove { task_id } => {
            store.remove_task(&task_id)?;
            println!("Removed task {}", task_id);
        }
    }
    Ok(())
}
