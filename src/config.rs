use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::ScanRoot;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub raidlog: RaidlogConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Core settings: where logs live and where the session database is kept
#[derive(Debug, Clone, Deserialize)]
pub struct RaidlogConfig {
    /// Directory the game client writes its session folders into.
    /// Scanned by full scans and by the recurring poll.
    #[serde(default)]
    pub log_root: Option<PathBuf>,
    /// Cold-storage directory that old session folders are archived into.
    /// Scanned by full scans only.
    #[serde(default)]
    pub log_storage: Option<PathBuf>,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Wipe all sessions and checkpoints before a full scan
    #[serde(default)]
    pub clear_before_scan: bool,
}

/// Recurring incremental scan settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Seconds between ticks; 0 disables polling
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Cold-storage housekeeping settings
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Number of most recent session folders left in log_root
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            keep_count: default_keep_count(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_keep_count() -> usize {
    5
}

pub const LOG_ROOT_LABEL: &str = "Log Root";
pub const LOG_STORAGE_LABEL: &str = "Log Storage";

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAIDLOG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAIDLOG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.raidlog.log_root.is_none() && self.raidlog.log_storage.is_none() {
            anyhow::bail!(
                "Set at least one of raidlog.log_root or raidlog.log_storage in config.toml"
            );
        }

        for root in self.scan_roots() {
            if root.path.exists() && !root.path.is_dir() {
                anyhow::bail!(
                    "{} must be a directory, not a file: {}",
                    root.label,
                    root.path.display()
                );
            }
        }

        if self.archive.keep_count == 0 {
            anyhow::bail!("archive.keep_count must be greater than 0");
        }

        Ok(())
    }

    /// Start env_logger. RUST_LOG takes precedence over `raidlog.log_level`.
    ///
    /// Also warns about configured roots that do not exist yet; the game
    /// creates them on first launch, so they are not a load error.
    pub fn init_logging(&self) {
        env_logger::Builder::from_env(
            env_logger::Env::default().filter_or("RUST_LOG", &self.raidlog.log_level),
        )
        .init();

        for root in self.missing_roots() {
            log::warn!("{} does not exist yet: {}", root.label, root.path.display());
        }
    }

    /// Configured roots that are not on disk
    pub fn missing_roots(&self) -> Vec<ScanRoot> {
        self.scan_roots()
            .into_iter()
            .filter(|root| !root.path.exists())
            .collect()
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.raidlog.db_path
    }

    /// Every configured root, active logs first
    pub fn scan_roots(&self) -> Vec<ScanRoot> {
        let mut roots = Vec::new();
        if let Some(path) = &self.raidlog.log_root {
            roots.push(ScanRoot::new(path, LOG_ROOT_LABEL));
        }
        if let Some(path) = &self.raidlog.log_storage {
            roots.push(ScanRoot::new(path, LOG_STORAGE_LABEL));
        }
        roots
    }

    /// Roots visited by the recurring poll. Archived folders never grow,
    /// so only the active log root is polled.
    pub fn poll_roots(&self) -> Vec<ScanRoot> {
        self.raidlog
            .log_root
            .iter()
            .map(|path| ScanRoot::new(path, LOG_ROOT_LABEL))
            .collect()
    }

    /// Poll interval, `None` when polling is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        match self.polling.interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
