use clap::Parser;
use raidlog::ingest::{open_runner, CheckpointStore, FileOutcome, ScanReport};
use raidlog::Config;
use std::sync::Arc;
use std::time::Instant;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "scan")]
#[command(about = "Ingest session records from application logs")]
struct Args {
    /// Also top up files that grew since they were last ingested
    #[arg(short, long)]
    incremental: bool,

    /// Remove all stored checkpoints and sessions before scanning
    #[arg(short, long)]
    clear: bool,

    /// Print the scan report as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load()?;
    config.init_logging();
    log::info!("Database path: {}", config.db_path().display());

    let runner = Arc::new(open_runner(&config).await?);
    let roots = config.scan_roots();

    if args.clear || config.raidlog.clear_before_scan {
        log::info!("Clearing all checkpoints and sessions");
        let runner = runner.clone();
        tokio::task::spawn_blocking(move || runner.store().clear_all()).await??;
    }

    let incremental = args.incremental;
    let start = Instant::now();
    let report = tokio::task::spawn_blocking(move || {
        if incremental {
            runner.run_incremental_scan(&roots)
        } else {
            runner.run_full_scan(&roots)
        }
    })
    .await?;
    let elapsed = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        println!("Time elapsed: {:.2}s", elapsed.as_secs_f64());
    }

    Ok(())
}

fn print_report(report: &ScanReport) {
    for root in &report.roots {
        println!("\n=== {} ({}) ===", root.label, root.path.display());
        if root.subdirectories.is_empty() {
            println!("No subdirectories");
        }
        for dir in &root.subdirectories {
            println!(
                "{:<40} {}  {:>4} log file(s)",
                dir.name,
                dir.last_modified.format("%Y-%m-%d %H:%M"),
                dir.matching_file_count
            );
        }
        println!("{} log file(s) found", root.files_found);
    }

    println!("\n=== Files ===");
    for file in &report.files {
        let status = match &file.outcome {
            FileOutcome::Ingested { records, lines } => format!("new, {} sessions / {} lines", records, lines),
            FileOutcome::Appended { records, from_line, to_line } => {
                format!("grown, {} sessions from lines {}..{}", records, from_line + 1, to_line)
            }
            FileOutcome::AlreadyProcessed => "already processed".to_string(),
            FileOutcome::Unchanged => "unchanged".to_string(),
            FileOutcome::Failed { error } => format!("FAILED: {}", error),
        };
        println!(
            "[{}] {}  {}  ({})",
            file.root_label,
            file.file.last_modified.format("%Y-%m-%d %H:%M"),
            file.file.file_name,
            status
        );
    }

    println!("\n=== Scan Complete ===");
    println!("Files scanned:   {}", report.files.len());
    println!("New files:       {}", report.files_ingested());
    println!("Grown files:     {}", report.files_appended());
    println!("Skipped:         {}", report.files_skipped());
    println!("Failed:          {}", report.files_failed());
    println!("Sessions stored: {}", report.records_inserted());
}
