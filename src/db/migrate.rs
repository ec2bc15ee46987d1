//! Numbered SQL-file migrations (`migrations/NNN_name.sql`), each applied once
//! inside its own transaction and recorded in `schema_migrations`.

use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, RaidlogError};

struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations, oldest first
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Split `"002_indexes.sql"` into `(2, "002_indexes")`.
fn parse_migration_filename(filename: &str) -> Result<(u32, String)> {
    let stem = filename
        .strip_suffix(".sql")
        .ok_or_else(|| RaidlogError::Parse(format!("Not a migration file: {}", filename)))?;
    let version_str = stem
        .split('_')
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RaidlogError::Parse(format!("Invalid migration filename: {}", filename)))?;
    let version = version_str
        .parse()
        .map_err(|_| RaidlogError::Parse(format!("Invalid migration version: {}", version_str)))?;
    Ok((version, stem.to_string()))
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();

    for entry in fs::read_dir(migrations_dir)?.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RaidlogError::Parse("Invalid migration filename".to_string()))?;
        let (version, name) = parse_migration_filename(filename)?;
        let sql = fs::read_to_string(&path)?;
        migrations.push(Migration { version, name, sql });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Run all pending migrations
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let pending: Vec<Migration> = load_migrations(migrations_dir)?
        .into_iter()
        .filter(|m| !applied.contains(&m.name))
        .collect();

    if pending.is_empty() {
        log::debug!("Schema up to date ({} migrations applied)", applied.len());
        return Ok(());
    }

    for migration in pending {
        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            let context = Some(format!("Failed to execute migration {}: {}", migration.name, e));
            let code = match e {
                rusqlite::Error::SqliteFailure(code, _) => code,
                _ => rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            };
            RaidlogError::Database(rusqlite::Error::SqliteFailure(code, context))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    log::info!("All migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_parse_migration_filename() {
        assert_eq!(
            parse_migration_filename("001_core_tables.sql").unwrap(),
            (1, "001_core_tables".to_string())
        );
        assert!(parse_migration_filename("core.sql").is_err());
        assert!(parse_migration_filename("001_core.txt").is_err());
    }

    #[test]
    fn test_load_migrations_sorted_by_version() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("010_late.sql"), "CREATE TABLE late (id INTEGER);").unwrap();
        fs::write(dir.join("002_early.sql"), "CREATE TABLE early (id INTEGER);").unwrap();
        fs::write(dir.join("README.md"), "not a migration").unwrap();

        let migrations = load_migrations(dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 2);
        assert_eq!(migrations[1].version, 10);
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");

        run_migrations(&mut conn, &migrations_dir).unwrap();
        let first = get_applied_migrations(&conn).unwrap();
        run_migrations(&mut conn, &migrations_dir).unwrap();
        let second = get_applied_migrations(&conn).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_migration_is_database_error_and_not_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("001_ok.sql"), "CREATE TABLE ok (id INTEGER);").unwrap();
        fs::write(dir.join("002_broken.sql"), "CREATE TABLE broken (id INTEGER;").unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        let err = run_migrations(&mut conn, &dir).unwrap_err();
        assert!(matches!(err, RaidlogError::Database(_)));
        assert!(err.to_string().contains("002_broken"));
        assert_eq!(get_applied_migrations(&conn).unwrap(), vec!["001_ok".to_string()]);
    }

    #[test]
    fn test_full_migration_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        run_migrations(&mut conn, &migrations_dir).unwrap();

        let tables = table_names(&conn, "table");
        assert!(tables.contains(&"log_instances".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes = table_names(&conn, "index");
        for expected in [
            "idx_sessions_timestamp",
            "idx_sessions_map",
            "idx_sessions_dc_name",
            "idx_sessions_instance",
        ] {
            assert!(indexes.contains(&expected.to_string()), "missing index {}", expected);
        }
    }
}
