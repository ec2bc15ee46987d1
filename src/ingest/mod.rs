pub mod parser;
pub mod walker;
pub mod reader;
pub mod store;
pub mod db_writer;
pub mod incremental;
pub mod runner;

pub use parser::{SessionRecord, parse_line, parse_dc_info, parse_timestamp};
pub use walker::{
    LogFileDescriptor, SubdirectoryDescriptor, is_application_log, list_subdirectories, scan_directory,
};
pub use reader::{count_lines, for_each_line_from};
pub use store::{CheckpointStore, InstanceId};
pub use db_writer::SqliteStore;
pub use incremental::{ScanMode, WorkItem, WorkPlan, plan_file, plan_work};
pub use runner::{FileOutcome, FileReport, IngestionRunner, RootSummary, ScanReport, ScanRoot, parse_file_from};

/// Open the configured database, apply pending migrations and wrap it in a
/// runner ready for scanning.
pub async fn open_runner(config: &crate::Config) -> crate::error::Result<IngestionRunner<SqliteStore>> {
    let db = crate::db::Db::new(config.db_path());
    db.initialize(&crate::db::migrations_dir()).await?;
    Ok(IngestionRunner::new(SqliteStore::new(db)))
}
