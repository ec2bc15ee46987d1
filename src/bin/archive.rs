//! Move old session directories from the log root into log storage.

use clap::Parser;
use raidlog::archive::{cleanup_old_directories, plan_cleanup};
use raidlog::ingest::open_runner;
use raidlog::Config;
use anyhow::{bail, Result};

#[derive(Parser, Debug)]
#[command(name = "archive")]
#[command(about = "Keep the newest session directories in the log root and move the rest to storage")]
struct Args {
    /// Number of newest directories to keep (defaults to archive.keep_count)
    #[arg(long)]
    keep: Option<usize>,

    /// List what would be moved without touching anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    config.init_logging();

    let (Some(log_root), Some(storage)) = (&config.raidlog.log_root, &config.raidlog.log_storage) else {
        bail!("archive needs both raidlog.log_root and raidlog.log_storage in config.toml");
    };

    let keep = args.keep.unwrap_or(config.archive.keep_count);
    if keep == 0 {
        bail!("--keep must be at least 1");
    }

    if args.dry_run {
        let plan = plan_cleanup(log_root, storage, keep);
        println!("Would move {} directories to {}:", plan.len(), storage.display());
        for dir in plan {
            println!("  {}  {}", dir.last_modified.format("%Y-%m-%d %H:%M"), dir.name);
        }
        return Ok(());
    }

    // moved files keep their checkpoints under the new path
    let runner = open_runner(&config).await?;
    let (root, dest) = (log_root.clone(), storage.clone());
    let moved = tokio::task::spawn_blocking(move || {
        cleanup_old_directories(runner.store(), &root, &dest, keep)
    })
    .await??;
    println!("Moved {} directories to {}", moved, storage.display());
    Ok(())
}
