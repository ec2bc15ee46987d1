use raidlog::db::{migrate, Db};
use raidlog::error::RaidlogError;
use raidlog::ingest::{CheckpointStore, SqliteStore};
use raidlog::Config;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "clear" => run_clear(&config).await?,
        "verify" => run_schema_verification(&config).await?,
        other => {
            log::warn!("Unknown command '{}', running verify", other);
            run_schema_verification(&config).await?;
        }
    }

    Ok(())
}

async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.initialize(&raidlog::db::migrations_dir()).await?;
    log::info!("Database initialized successfully");
    Ok(db)
}

/// Delete every checkpoint and session so the next scan starts from scratch
async fn run_clear(config: &Config) -> Result<()> {
    let db = open_db(config).await?;
    let store = SqliteStore::new(db);
    tokio::task::spawn_blocking(move || store.clear_all()).await??;
    log::info!("✓ All checkpoints and sessions removed");
    Ok(())
}

async fn run_schema_verification(config: &Config) -> Result<()> {
    log::info!("Starting raidlog v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration loaded successfully");
    for root in config.scan_roots() {
        log::info!("{}: {}", root.label, root.path.display());
    }
    log::info!("Database path: {}", config.db_path().display());
    match config.poll_interval() {
        Some(interval) => log::info!("Poll interval: {}s", interval.as_secs()),
        None => log::info!("Polling disabled"),
    }

    let db = open_db(config).await?;
    verify_database_schema(&db).await?;

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["log_instances", "schema_migrations", "sessions"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if tables.iter().any(|t| t == table) {
                log::debug!("✓ Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            }
        }

        if !all_tables_exist {
            return Err(RaidlogError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        if applied.len() < 2 {
            return Err(RaidlogError::Config(format!("Expected at least 2 migrations, found {}", applied.len())));
        }
        log::debug!("✓ {} migrations applied", applied.len());

        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for index_name in ["idx_sessions_timestamp", "idx_sessions_map", "idx_sessions_dc_name", "idx_sessions_instance"] {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("✓ Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {}", index_name);
            }
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RaidlogError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RaidlogError::Config("Foreign keys not enabled".to_string()));
        }
        log::debug!("✓ Foreign keys enabled");

        let (files, sessions): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM log_instances), (SELECT COUNT(*) FROM sessions)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        log::info!("{} log files tracked, {} sessions stored", files, sessions);

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RaidlogError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
