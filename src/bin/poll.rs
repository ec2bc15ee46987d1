//! Keep the database current: one full scan at startup, then periodic
//! incremental scans of the log root until Ctrl+C.

use clap::Parser;
use raidlog::ingest::open_runner;
use raidlog::{Config, Poller};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "poll")]
#[command(about = "Poll the log root for new and grown log files")]
struct Args {
    /// Override polling.interval_secs from config.toml (0 disables polling)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Skip the full scan of all roots at startup
    #[arg(long)]
    no_initial_scan: bool,

    /// How often to re-read config.toml for a changed interval, in seconds
    #[arg(long, default_value = "30")]
    reload_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load()?;
    config.init_logging();
    log::info!("Starting raidlog poller");
    let runner = Arc::new(open_runner(&config).await?);

    if !args.no_initial_scan {
        let runner = runner.clone();
        let roots = config.scan_roots();
        tokio::task::spawn_blocking(move || runner.run_full_scan(&roots)).await?;
    }

    let interval_for = |config: &Config| match args.interval_secs {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.poll_interval(),
    };

    let mut poller = Poller::new(runner, config.poll_roots());
    let mut current = interval_for(&config);
    poller.start(current);

    let mut reload = tokio::time::interval(Duration::from_secs(args.reload_secs.max(1)));
    reload.tick().await;

    log::info!("Polling (Ctrl+C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
            _ = reload.tick(), if args.interval_secs.is_none() => {
                match Config::load() {
                    Ok(fresh) => {
                        let wanted = interval_for(&fresh);
                        if wanted != current {
                            log::info!("Poll interval changed in config");
                            poller.reconfigure(wanted);
                            current = wanted;
                        }
                    }
                    Err(e) => log::warn!("Ignoring config reload: {}", e),
                }
            }
        }
    }

    poller.stop();
    Ok(())
}
