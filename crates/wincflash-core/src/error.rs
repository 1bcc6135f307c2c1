//! Error types for WINC programmer operations

use thiserror::Error;

/// Coarse classification of an [`Error`]
///
/// Every category is fatal to the operation that produced it. Nothing in
/// this crate retries; a caller that wants to retry a flash must start over
/// from the erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Read/write failure on the byte stream, or the stream closed mid-read
    Transport,
    /// The programmer answered with bytes we did not expect
    Protocol,
    /// The programmer cannot handle the transfer sizes we need
    Capability,
    /// Readback did not match what was written
    Verification,
    /// The request was rejected before anything was sent
    Usage,
}

/// WINC programmer errors
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to connect to device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    /// The transport stopped delivering bytes before a response was complete
    #[error("Transport closed unexpectedly ({received} of {expected} bytes received)")]
    TransportClosed { expected: usize, received: usize },

    /// No data arrived within the transport's read deadline
    #[error("Communication timeout")]
    Timeout,

    /// Acknowledgment was something other than "OK"
    #[error("Missing ack on {opcode}: got {found:02X?}")]
    AckMismatch { opcode: &'static str, found: [u8; 2] },

    /// Handshake response does not look like a version token at all
    #[error("Programmer is not responding (got {found:02X?})")]
    NotResponding { found: Vec<u8> },

    /// Handshake returned a version we do not speak
    #[error("Programmer version mismatch, {expected} needed: {}", String::from_utf8_lossy(.found))]
    VersionMismatch { expected: &'static str, found: Vec<u8> },

    /// Negotiated payload size is below what a flash needs
    #[error("Programmer reports {reported} as maximum payload size ({required} is needed)")]
    PayloadTooSmall { reported: u16, required: u16 },

    /// Readback differs from the written image
    #[error(
        "Flash data does not match written at offset {offset} (address 0x{address:08X}): \
         expected 0x{expected:02X}, found 0x{found:02X}"
    )]
    VerifyMismatch {
        offset: usize,
        address: u32,
        expected: u8,
        found: u8,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A flash operation tried to skip or repeat a phase
    #[error("Invalid flash state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl Error {
    /// Map this error onto its [`ErrorCategory`]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConnectionFailed(_)
            | Error::IoError(_)
            | Error::TransportClosed { .. }
            | Error::Timeout => ErrorCategory::Transport,
            #[cfg(feature = "serial")]
            Error::SerialError(_) => ErrorCategory::Transport,
            Error::AckMismatch { .. }
            | Error::NotResponding { .. }
            | Error::VersionMismatch { .. } => ErrorCategory::Protocol,
            Error::PayloadTooSmall { .. } => ErrorCategory::Capability,
            Error::VerifyMismatch { .. } => ErrorCategory::Verification,
            Error::InvalidParameter(_) | Error::InvalidTransition { .. } => ErrorCategory::Usage,
        }
    }
}

/// Result type for WINC programmer operations
pub type Result<T> = core::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::IoError(e.to_string()),
        }
    }
}
