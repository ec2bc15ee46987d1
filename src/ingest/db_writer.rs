use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use crate::db::Db;
use crate::error::{Result, RaidlogError};
use super::parser::SessionRecord;
use super::store::{CheckpointStore, InstanceId};

/// Storage layout for session timestamps; sorts lexically in time order
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const BATCH_SIZE: usize = 100;

fn now_string() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Whether a checkpoint row exists for `path`
pub fn is_file_known(conn: &Connection, path: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM log_instances WHERE file_path = ?1")?;
    Ok(stmt.exists(params![path])?)
}

/// Create a checkpoint row with zero processed lines
pub fn create_checkpoint(
    conn: &Connection,
    file_name: &str,
    path: &str,
    record_count: usize,
) -> Result<InstanceId> {
    conn.execute(
        "INSERT INTO log_instances (file_name, file_path, processed_at, item_count, processed_line_count)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![file_name, path, now_string(), record_count as i64],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RaidlogError::Checkpoint(format!("{} already has a checkpoint", path))
        }
        other => RaidlogError::Database(other),
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn checkpoint_line_count(conn: &Connection, path: &str) -> Result<u64> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT processed_line_count FROM log_instances WHERE file_path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0).max(0) as u64)
}

/// Raise the processed line count of `path`. Never lowers it.
pub fn set_checkpoint_line_count(conn: &Connection, path: &str, line_count: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE log_instances SET processed_line_count = ?1, processed_at = ?2
         WHERE file_path = ?3 AND processed_line_count <= ?1",
        params![line_count as i64, now_string(), path],
    )?;
    if updated == 0 {
        return Err(if is_file_known(conn, path)? {
            RaidlogError::Checkpoint(format!(
                "refusing to move {} back to line {}",
                path, line_count
            ))
        } else {
            RaidlogError::InvalidInput(format!("no checkpoint for {}", path))
        });
    }
    Ok(())
}

pub fn instance_handle(conn: &Connection, path: &str) -> Result<Option<InstanceId>> {
    Ok(conn
        .query_row(
            "SELECT instance_id FROM log_instances WHERE file_path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?)
}

/// Insert sessions for `instance_id` in batches, reusing one prepared statement
pub fn append_records(
    conn: &Connection,
    instance_id: InstanceId,
    records: &[SessionRecord],
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO sessions (
            instance_id, timestamp, ip_address, map, raid_id, dc_code, dc_name, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?;
    let created_at = now_string();

    let mut count = 0;
    for batch in records.chunks(BATCH_SIZE) {
        for record in batch {
            stmt.execute(params![
                instance_id,
                record.timestamp.map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
                record.ip_address,
                record.map,
                record.raid_id,
                record.dc_code,
                record.dc_name,
                created_at,
            ])?;
        }
        count += batch.len();
        log::debug!("Inserted {}/{} sessions for instance {}", count, records.len(), instance_id);
    }
    Ok(count)
}

/// Rewrite the `old_dir` prefix of checkpoint paths to `new_dir`
pub fn move_checkpoints(conn: &Connection, old_dir: &str, new_dir: &str) -> Result<usize> {
    let sep = std::path::MAIN_SEPARATOR;
    let old_prefix = format!("{}{}", old_dir.trim_end_matches(sep), sep);
    let new_prefix = format!("{}{}", new_dir.trim_end_matches(sep), sep);
    // substr() counts characters, not bytes
    let old_len = old_prefix.chars().count() as i64;

    conn.execute(
        "UPDATE log_instances SET file_path = ?2 || substr(file_path, ?3 + 1)
         WHERE substr(file_path, 1, ?3) = ?1",
        params![old_prefix, new_prefix, old_len],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RaidlogError::Checkpoint(format!("{} already has checkpoints", new_dir))
        }
        other => RaidlogError::Database(other),
    })
}

/// SQLite-backed checkpoint store. Each call opens its own connection, so a
/// store can be shared between the full-scan and poll contexts.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn create_checkpoint(&self, file_name: &str, path: &str, record_count: usize) -> Result<InstanceId> {
        create_checkpoint(&self.db.open_connection()?, file_name, path, record_count)
    }

    pub fn set_checkpoint_line_count(&self, path: &str, line_count: u64) -> Result<()> {
        set_checkpoint_line_count(&self.db.open_connection()?, path, line_count)
    }

    pub fn append_records(&self, instance_id: InstanceId, records: &[SessionRecord]) -> Result<usize> {
        let mut conn = self.db.open_connection()?;
        let tx = conn.transaction()?;
        let count = append_records(&tx, instance_id, records)?;
        tx.execute(
            "UPDATE log_instances SET item_count = item_count + ?1 WHERE instance_id = ?2",
            params![count as i64, instance_id],
        )?;
        tx.commit()?;
        Ok(count)
    }
}

impl CheckpointStore for SqliteStore {
    fn is_file_known(&self, path: &str) -> Result<bool> {
        is_file_known(&self.db.open_connection()?, path)
    }

    fn checkpoint_line_count(&self, path: &str) -> Result<u64> {
        checkpoint_line_count(&self.db.open_connection()?, path)
    }

    fn instance_handle(&self, path: &str) -> Result<Option<InstanceId>> {
        instance_handle(&self.db.open_connection()?, path)
    }

    fn commit_new_file(
        &self,
        file_name: &str,
        path: &str,
        line_count: u64,
        records: &[SessionRecord],
    ) -> Result<InstanceId> {
        let mut conn = self.db.open_connection()?;
        // IMMEDIATE takes the write lock up front so a concurrent pass
        // cannot create the same checkpoint between our check and insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let instance_id = create_checkpoint(&tx, file_name, path, records.len())?;
        set_checkpoint_line_count(&tx, path, line_count)?;
        append_records(&tx, instance_id, records)?;

        tx.commit()?;
        Ok(instance_id)
    }

    fn commit_growth(
        &self,
        path: &str,
        expected_line_count: u64,
        new_line_count: u64,
        records: &[SessionRecord],
    ) -> Result<()> {
        if new_line_count < expected_line_count {
            return Err(RaidlogError::Checkpoint(format!(
                "refusing to move {} from line {} back to {}",
                path, expected_line_count, new_line_count
            )));
        }

        let mut conn = self.db.open_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let instance_id = instance_handle(&tx, path)?
            .ok_or_else(|| RaidlogError::InvalidInput(format!("no checkpoint for {}", path)))?;

        let updated = tx.execute(
            "UPDATE log_instances
             SET processed_line_count = ?1, item_count = item_count + ?2, processed_at = ?3
             WHERE instance_id = ?4 AND processed_line_count = ?5",
            params![
                new_line_count as i64,
                records.len() as i64,
                now_string(),
                instance_id,
                expected_line_count as i64,
            ],
        )?;
        if updated == 0 {
            return Err(RaidlogError::Checkpoint(format!(
                "{} is no longer at line {}",
                path, expected_line_count
            )));
        }

        append_records(&tx, instance_id, records)?;
        tx.commit()?;
        Ok(())
    }

    fn move_checkpoints(&self, old_dir: &str, new_dir: &str) -> Result<usize> {
        let mut conn = self.db.open_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let moved = move_checkpoints(&tx, old_dir, new_dir)?;
        tx.commit()?;
        log::debug!("Moved {} checkpoints from {} to {}", moved, old_dir, new_dir);
        Ok(moved)
    }

    fn clear_all(&self) -> Result<()> {
        let mut conn = self.db.open_connection()?;
        let tx = conn.transaction()?;
        let sessions = tx.execute("DELETE FROM sessions", [])?;
        let instances = tx.execute("DELETE FROM log_instances", [])?;
        tx.commit()?;
        log::info!("Cleared {} sessions from {} log files", sessions, instances);
        Ok(())
    }
}
