pub mod config;
pub mod error;
pub mod db;
pub mod ingest;
pub mod poll;
pub mod mapping;
pub mod archive;
pub mod query;

pub use config::Config;
pub use error::{RaidlogError, Result};
pub use ingest::{IngestionRunner, ScanReport, ScanRoot, SqliteStore};
pub use poll::Poller;
