use thiserror::Error;

/// Main error type for raidlog
#[derive(Error, Debug)]
pub enum RaidlogError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// A checkpoint write lost a race or would move backward
    #[error("Checkpoint conflict: {0}")]
    Checkpoint(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using RaidlogError
pub type Result<T> = std::result::Result<T, RaidlogError>;
