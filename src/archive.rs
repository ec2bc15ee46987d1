//! Cold-storage housekeeping: keep the newest session directories under the
//! log root and move older ones into storage.
//!
//! Moved directories stay scannable because storage is one of the scan roots.
//! Checkpoints are keyed by full path, so each move also re-keys the
//! checkpoints of the files it carried; the next scan then sees them as
//! already processed.

use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;
use crate::ingest::{list_subdirectories, CheckpointStore, SubdirectoryDescriptor};

/// Subdirectories of `log_root` that a cleanup would move, oldest last.
/// `storage` itself is never a candidate when it lives inside `log_root`.
pub fn plan_cleanup(log_root: &Path, storage: &Path, keep_count: usize) -> Vec<SubdirectoryDescriptor> {
    let storage = storage.canonicalize().ok();
    list_subdirectories(log_root)
        .into_iter()
        .filter(|dir| storage.is_none() || dir.full_path.canonicalize().ok() != storage)
        .skip(keep_count)
        .collect()
}

/// Move every subdirectory beyond the newest `keep_count` into `storage`.
///
/// Returns how many directories were moved. A directory that fails to move
/// is logged and left in place.
pub fn cleanup_old_directories<S>(store: &S, log_root: &Path, storage: &Path, keep_count: usize) -> Result<usize>
where
    S: CheckpointStore + ?Sized,
{
    if !log_root.is_dir() {
        log::warn!("Log root {} does not exist; nothing to archive", log_root.display());
        return Ok(0);
    }

    if !storage.is_dir() {
        fs::create_dir_all(storage)?;
        log::info!("Created storage directory {}", storage.display());
    }

    let candidates = plan_cleanup(log_root, storage, keep_count);
    log::info!(
        "Keeping {} newest directories in {}, moving {} to {}",
        keep_count,
        log_root.display(),
        candidates.len(),
        storage.display()
    );

    let mut moved = 0;
    for dir in candidates {
        match move_directory(&dir.full_path, storage) {
            Ok(dest) => {
                log::info!("✓ {} -> {}", dir.name, dest.display());
                moved += 1;
                let (old_key, new_key) = (dir.full_path.to_string_lossy(), dest.to_string_lossy());
                match store.move_checkpoints(&old_key, &new_key) {
                    Ok(n) => log::debug!("Re-keyed {} checkpoints for {}", n, dir.name),
                    Err(e) => log::error!(
                        "✗ checkpoints for {} still point at {}: {}",
                        dir.name,
                        dir.full_path.display(),
                        e
                    ),
                }
            }
            Err(e) => log::error!("✗ {}: {}", dir.full_path.display(), e),
        }
    }

    log::info!("Archive complete: moved {} directories", moved);
    Ok(moved)
}

/// Move `source` into `storage_dir`, keeping its name unless taken.
/// Returns the destination path.
pub fn move_directory(source: &Path, storage_dir: &Path) -> Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no directory name"))?;
    let dest = unique_destination(storage_dir, &name.to_string_lossy());

    if let Err(e) = fs::rename(source, &dest) {
        // rename cannot cross filesystems
        log::debug!("rename failed ({}); copying {} instead", e, source.display());
        copy_dir_recursive(source, &dest)?;
        fs::remove_dir_all(source)?;
    }

    Ok(dest)
}

fn unique_destination(storage_dir: &Path, name: &str) -> PathBuf {
    let dest = storage_dir.join(name);
    if !dest.exists() {
        return dest;
    }

    let stamped = format!("{}_{}", name, Local::now().format("%Y%m%d_%H%M%S"));
    let mut dest = storage_dir.join(&stamped);
    let mut n = 2;
    while dest.exists() {
        dest = storage_dir.join(format!("{}_{}", stamped, n));
        n += 1;
    }
    dest
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::db_writer::tests::{session_count, setup_test_store};
    use crate::ingest::{FileOutcome, IngestionRunner, ScanRoot};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const SESSION_LINE: &str = "2025-11-27 08:42:21.000|1.0|Debug|application|profileStatus: 'Profileid: 5eac, Ip: 74.1.2.3, Location: bigmap, Sid: DE-FRM03G002_1, shortId: ABC123'\n";

    fn session_dir(root: &Path, name: &str, secs_ago: u64) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("application.log"), name).unwrap();
        let when = SystemTime::now() - Duration::from_secs(secs_ago);
        fs::File::open(&dir).unwrap().set_modified(when).unwrap();
        dir
    }

    #[test]
    fn test_moves_all_but_newest() {
        let (store, _db_dir) = setup_test_store();
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Logs");
        let storage = temp_dir.path().join("Storage");
        session_dir(&root, "d1", 10);
        session_dir(&root, "d2", 20);
        session_dir(&root, "d3", 30);
        session_dir(&root, "d4", 40);

        let moved = cleanup_old_directories(&store, &root, &storage, 2).unwrap();
        assert_eq!(moved, 2);
        assert!(root.join("d1").is_dir());
        assert!(root.join("d2").is_dir());
        assert!(!root.join("d3").exists());
        assert_eq!(fs::read_to_string(storage.join("d3/application.log")).unwrap(), "d3");
        assert!(storage.join("d4").is_dir());
    }

    #[test]
    fn test_name_collision_gets_timestamp_suffix() {
        let (store, _db_dir) = setup_test_store();
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Logs");
        let storage = temp_dir.path().join("Storage");
        session_dir(&root, "keep", 10);
        session_dir(&root, "old", 20);
        fs::create_dir_all(storage.join("old")).unwrap();

        assert_eq!(cleanup_old_directories(&store, &root, &storage, 1).unwrap(), 1);

        let names: Vec<String> = fs::read_dir(&storage)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        let renamed = names.iter().find(|n| n.as_str() != "old").unwrap();
        assert!(renamed.starts_with("old_"));
        assert_eq!(renamed.len(), "old_".len() + "yyyyMMdd_HHmmss".len());
    }

    #[test]
    fn test_missing_root_moves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _db_dir) = setup_test_store();
        let moved = cleanup_old_directories(
            &store,
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("Storage"),
            5,
        )
        .unwrap();
        assert_eq!(moved, 0);
    }

    #[test]
    fn test_fewer_dirs_than_keep_count() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Logs");
        session_dir(&root, "only", 10);

        let (store, _db_dir) = setup_test_store();
        let moved = cleanup_old_directories(&store, &root, &temp_dir.path().join("Storage"), 5).unwrap();
        assert_eq!(moved, 0);
        assert!(root.join("only").is_dir());
    }

    #[test]
    fn test_storage_inside_root_is_not_moved() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Logs");
        let storage = root.join("Storage");
        session_dir(&root, "newest", 10);
        session_dir(&root, "older", 50);
        fs::create_dir_all(&storage).unwrap();
        fs::File::open(&storage)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(100))
            .unwrap();

        let plan = plan_cleanup(&root, &storage, 1);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "older");
    }

    #[test]
    fn test_archived_sessions_are_not_ingested_twice() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Logs");
        let storage = temp_dir.path().join("Storage");
        for (name, secs_ago) in [("new", 10), ("old", 20)] {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("application.log"), format!("{SESSION_LINE}{SESSION_LINE}")).unwrap();
            fs::File::open(&dir)
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
                .unwrap();
        }

        let (store, _db_dir) = setup_test_store();
        let runner = IngestionRunner::new(store);
        let roots = vec![ScanRoot::new(&root, "Log Root"), ScanRoot::new(&storage, "Log Storage")];
        runner.run_full_scan(&roots);
        assert_eq!(session_count(runner.store()), 4);

        assert_eq!(cleanup_old_directories(runner.store(), &root, &storage, 1).unwrap(), 1);
        let moved_key = storage.join("old").join("application.log").to_string_lossy().into_owned();
        assert_eq!(runner.store().checkpoint_line_count(&moved_key).unwrap(), 2);

        let report = runner.run_full_scan(&roots);
        assert_eq!(report.records_inserted(), 0);
        assert!(report.files.iter().all(|f| f.outcome == FileOutcome::AlreadyProcessed));
        assert_eq!(session_count(runner.store()), 4);

        let report = runner.run_incremental_scan(&roots);
        assert_eq!(report.records_inserted(), 0);
        assert_eq!(session_count(runner.store()), 4);
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/application.log"), "x").unwrap();

        let dest = temp_dir.path().join("dest");
        copy_dir_recursive(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a/b/application.log")).unwrap(), "x");
    }
}
