//! Error types for firmware catalog operations

use thiserror::Error;

/// Firmware catalog errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error reading the catalog
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog is not valid JSON or does not have the expected shape
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No board with this FQBN
    #[error("invalid FQBN: {0}")]
    InvalidFqbn(String),

    /// The board has no firmware with this version
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// The board lists no firmware at all
    #[error("cannot find latest version for {0}")]
    NoFirmware(String),

    /// The lookup is not available for this module
    #[error("not implemented for {0} module")]
    NotSupported(String),
}

/// Result type for catalog operations
pub type Result<T> = core::result::Result<T, IndexError>;
