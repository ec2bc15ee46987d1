use chrono::NaiveDate;
use clap::Parser;
use raidlog::db::Db;
use raidlog::query::{
    date_range_label, latest_session, map_distribution, server_distribution, timeline, DateRange,
    DEFAULT_TIMELINE_DAYS,
};
use raidlog::Config;
use serde_json::json;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "stats")]
#[command(about = "Summarize stored raid sessions")]
struct Args {
    /// Timeline window in days
    #[arg(long, default_value_t = DEFAULT_TIMELINE_DAYS)]
    days: u32,

    /// Only count sessions on or after this date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Only count sessions on or before this date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let range = DateRange::new(args.from, args.to)?;

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    db.initialize(&raidlog::db::migrations_dir()).await?;

    let latest = latest_session(&db).await?;
    let maps = map_distribution(&db, range).await?;
    let servers = server_distribution(&db, range).await?;
    let recent = timeline(&db, args.days.max(1)).await?;

    if args.json {
        let out = json!({
            "latest": latest,
            "summary": latest.as_ref().map(|l| l.summary()),
            "maps": maps,
            "servers": servers,
            "timeline": recent,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("\n=== raidlog Session Statistics ===\n");

    match &latest {
        Some(l) => println!("{}", l.summary()),
        None => {
            println!("No sessions stored yet.");
            println!("\nRun `scan` to ingest your logs.");
            return Ok(());
        }
    }

    println!("\nMap Distribution (Total Raids: {})", maps.total);
    println!("{}", date_range_label(maps.first_seen, maps.last_seen));
    println!("{:-<40}", "");
    println!("{:<20} {:>8} {:>10}", "Map", "Count", "Share");
    println!("{:-<40}", "");
    for entry in &maps.entries {
        println!("{:<20} {:>8} {:>10}", entry.label, entry.count, entry.percentage_label());
    }
    println!("{:-<40}", "");

    println!("\nServer Distribution (Total Raids: {})", servers.total);
    println!("{}", date_range_label(servers.first_seen, servers.last_seen));
    println!("{:-<64}", "");
    println!("{:<10} {:<24} {:<8} {:>8} {:>10}", "DC", "Country", "City", "Count", "Share");
    println!("{:-<64}", "");
    for entry in &servers.entries {
        println!(
            "{:<10} {:<24} {:<8} {:>8} {:>9.1}%",
            entry.dc_name, entry.country_name, entry.city_code, entry.count, entry.percentage
        );
    }
    println!("{:-<64}", "");
    println!("By country:");
    for entry in &servers.by_country {
        println!("  {:<28} {:>8} {:>10}", entry.label, entry.count, entry.percentage_label());
    }

    println!("\nTimeline (last {} days, {} raids)", args.days.max(1), recent.len());
    println!("{:-<72}", "");
    for entry in &recent {
        let when = entry
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<17} {:<14} {:<24} {}",
            when,
            entry.map,
            entry.location,
            entry.raid_id.as_deref().unwrap_or("N/A")
        );
    }
    println!("{:-<72}", "");

    Ok(())
}
