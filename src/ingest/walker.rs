use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// A qualifying log file found during a scan
#[derive(Debug, Clone, Serialize)]
pub struct LogFileDescriptor {
    pub full_path: PathBuf,
    pub file_name: String,
    pub last_modified: DateTime<Local>,
    pub size_bytes: u64,
}

impl LogFileDescriptor {
    /// Identity of the file in the checkpoint table
    pub fn path_key(&self) -> String {
        self.full_path.to_string_lossy().into_owned()
    }
}

/// An immediate child directory of a scan root
#[derive(Debug, Clone, Serialize)]
pub struct SubdirectoryDescriptor {
    pub name: String,
    pub full_path: PathBuf,
    pub last_modified: DateTime<Local>,
    /// Qualifying log files anywhere beneath this directory
    pub matching_file_count: usize,
}

fn application_log_regex() -> &'static Regex {
    static APPLICATION_LOG: OnceLock<Regex> = OnceLock::new();
    APPLICATION_LOG.get_or_init(|| {
        Regex::new(r"(?i)application(?:_[0-9]+)?\.log$").expect("Invalid regex pattern")
    })
}

/// Whether a file name follows the client's log naming, e.g.
/// `2025.11.27_8-42-21_1.0.0.1.41967 application_000.log` or `application.log`.
pub fn is_application_log(file_name: &str) -> bool {
    application_log_regex().is_match(file_name)
}

/// Recursively discover qualifying log files under `root`, newest first.
///
/// A missing root yields an empty list. Entries that cannot be read or
/// stat-ed are skipped without aborting the walk.
pub fn scan_directory(root: &Path) -> Vec<LogFileDescriptor> {
    if !root.is_dir() {
        log::debug!("Scan root does not exist: {}", root.display());
        return Vec::new();
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_application_log(&file_name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                log::warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        files.push(LogFileDescriptor {
            full_path: entry.path().to_path_buf(),
            file_name,
            last_modified: DateTime::<Local>::from(modified),
            size_bytes: metadata.len(),
        });
    }

    files.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.full_path.cmp(&b.full_path))
    });

    log::info!("Discovered {} log files in {}", files.len(), root.display());
    files
}

/// Count qualifying log files anywhere beneath `dir`
pub fn count_matching_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_application_log(&e.file_name().to_string_lossy()))
        .count()
}

/// Immediate subdirectories of `root`, newest first, each with its count of
/// qualifying log files. A missing root yields an empty list.
pub fn list_subdirectories(root: &Path) -> Vec<SubdirectoryDescriptor> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                log::warn!("Skipping directory {}: {}", path.display(), e);
                continue;
            }
        };

        dirs.push(SubdirectoryDescriptor {
            name: entry.file_name().to_string_lossy().into_owned(),
            matching_file_count: count_matching_files(&path),
            full_path: path,
            last_modified: DateTime::<Local>::from(modified),
        });
    }

    dirs.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.name.cmp(&b.name))
    });
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, secs_ago: u64) {
        let when = SystemTime::now() - Duration::from_secs(secs_ago);
        fs::File::open(path).unwrap().set_modified(when).unwrap();
    }

    #[test]
    fn test_is_application_log() {
        assert!(is_application_log("2025.11.27_8-42-21 application_000.log"));
        assert!(is_application_log("2025.11.12_8-29-43_0.16.9.5.40743 application.log"));
        assert!(is_application_log("application.log"));
        assert!(is_application_log("APPLICATION_12.LOG"));
        assert!(!is_application_log("notes.log"));
        assert!(!is_application_log("application.txt"));
        assert!(!is_application_log("application_abc.log"));
        assert!(!is_application_log("application.log.bak"));
    }

    #[test]
    fn test_scan_directory_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("session_a/nested")).unwrap();
        fs::create_dir_all(root.join("session_b")).unwrap();

        let old = root.join("session_a/nested/x application_000.log");
        let new = root.join("session_b/application.log");
        fs::write(&old, "old\n").unwrap();
        fs::write(&new, "new\n").unwrap();
        fs::write(root.join("session_b/notes.log"), "skip").unwrap();
        fs::write(root.join("session_b/traces.txt"), "skip").unwrap();
        set_mtime(&old, 3600);
        set_mtime(&new, 10);

        let files = scan_directory(root);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].full_path, new);
        assert_eq!(files[0].file_name, "application.log");
        assert_eq!(files[0].size_bytes, 4);
        assert_eq!(files[1].full_path, old);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");
        assert!(scan_directory(&missing).is_empty());
        assert!(list_subdirectories(&missing).is_empty());
    }

    #[test]
    fn test_list_subdirectories_counts_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let older = root.join("2025.11.01_10-00-00");
        let newer = root.join("2025.11.02_10-00-00");
        fs::create_dir_all(older.join("deep")).unwrap();
        fs::create_dir_all(&newer).unwrap();
        fs::write(older.join("a application_000.log"), "").unwrap();
        fs::write(older.join("deep/b application_001.log"), "").unwrap();
        fs::write(older.join("other.log"), "").unwrap();
        fs::write(newer.join("application.log"), "").unwrap();
        fs::write(root.join("application.log"), "").unwrap();
        set_mtime(&older, 7200);
        set_mtime(&newer, 60);

        let dirs = list_subdirectories(root);
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].name, "2025.11.02_10-00-00");
        assert_eq!(dirs[0].matching_file_count, 1);
        assert_eq!(dirs[1].name, "2025.11.01_10-00-00");
        assert_eq!(dirs[1].matching_file_count, 2);
    }

    #[test]
    fn test_path_key_is_full_path() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("application.log");
        fs::write(&file, "x").unwrap();
        let files = scan_directory(temp_dir.path());
        assert_eq!(files[0].path_key(), file.to_string_lossy());
    }
}
