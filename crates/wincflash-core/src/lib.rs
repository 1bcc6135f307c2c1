//! wincflash-core - WINC module flash programming
//!
//! This crate implements the command/acknowledgment protocol spoken by the
//! programmer sketch that sits between a host and the flash of a WINC Wi-Fi
//! co-processor module, and the full-image flash sequence built on it.
//!
//! # Protocol Overview
//!
//! The host sends length-prefixed binary frames (opcode, address, value,
//! payload) over a byte stream. Erase, write and read are answered with the
//! two bytes `OK`. The programmer reports the largest payload it accepts,
//! and every write and read is chunked to that size.
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyACM0`, `COM3`, etc.
//! - TCP socket: `host:port` (serial-over-network bridges)
//!
//! # Example
//!
//! ```no_run
//! use wincflash_core::{flash_image, FirmwareImage, NoProgress, SerialTransport, WincFlasher};
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", Some(115200))?;
//! let mut flasher = WincFlasher::new(transport)?;
//!
//! let image = FirmwareImage::primary(std::fs::read("m2m_aio_3a0.bin")?)?;
//! flash_image(&mut flasher, &image, &mut NoProgress)?;
//! flasher.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod flash;
pub mod protocol;
pub mod transport;

// Re-exports
pub use device::WincFlasher;
pub use error::{Error, ErrorCategory, Result};
pub use flash::{
    flash_image, read_image, Chunk, ChunkPlan, FirmwareImage, FlashMachine, FlashProgress,
    FlashState, FlashStats, NoProgress,
};
pub use protocol::{FrameHeader, Opcode, Request};

#[cfg(feature = "serial")]
pub use transport::serial::SerialTransport;
pub use transport::tcp::TcpTransport;
pub use transport::{Connection, Transport};

/// Open a programmer session on the given connection string
///
/// This is a convenience function that handles both serial and TCP
/// connections and returns a session over a type-erased transport.
pub fn open(
    options: &str,
    baud: Option<u32>,
    timeout: std::time::Duration,
) -> Result<WincFlasher<Box<dyn Transport + Send>>> {
    let conn = Connection::parse(options)
        .map_err(Error::InvalidParameter)?
        .with_baud(baud);
    let transport = conn.open(timeout)?;
    WincFlasher::new(transport)
}

/// Open a programmer session via serial port
#[cfg(feature = "serial")]
pub fn open_serial(device: &str, baud: Option<u32>) -> Result<WincFlasher<SerialTransport>> {
    let transport = SerialTransport::open(device, baud)?;
    WincFlasher::new(transport)
}

/// Open a programmer session via TCP
pub fn open_tcp(host: &str, port: u16) -> Result<WincFlasher<TcpTransport>> {
    let transport = TcpTransport::connect(host, port, transport::DEFAULT_TIMEOUT)?;
    WincFlasher::new(transport)
}
