//! Transport layer abstraction for WINC programmer communication
//!
//! This module provides the byte stream interface the flash engine runs on,
//! the exact-count reader every response goes through, and serial and TCP
//! implementations.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default read/write deadline applied by the bundled transports
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default serial baud rate
pub const DEFAULT_BAUD: u32 = 115200;

/// Transport trait for reading and writing bytes
///
/// A read or write returning `Ok(0)` for a non-empty buffer means the
/// stream made no progress; the helpers in this module treat that as the
/// stream having closed.
pub trait Transport {
    /// Write some bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read some bytes, returning how many were received
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()>;

    /// Close the stream
    ///
    /// Any later read or write makes no progress.
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Write every byte of `data`, looping over partial writes
pub fn send_all<T: Transport + ?Sized>(transport: &mut T, data: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < data.len() {
        let n = transport.write(&data[sent..])?;
        if n == 0 {
            return Err(Error::TransportClosed {
                expected: data.len(),
                received: sent,
            });
        }
        sent += n;
    }
    transport.flush()
}

/// Fill `buf` completely from the transport
///
/// Performs as many reads as needed. A read that returns no bytes before the
/// buffer is full is reported as [`Error::TransportClosed`]; a short buffer is
/// never returned.
pub fn fill<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = transport.read(&mut buf[read..])?;
        if n == 0 {
            return Err(Error::TransportClosed {
                expected: buf.len(),
                received: read,
            });
        }
        read += n;
    }
    Ok(())
}

/// Read exactly `n` bytes into a new buffer
pub fn fill_exact<T: Transport + ?Sized>(transport: &mut T, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    fill(transport, &mut buf)?;
    Ok(buf)
}

/// Connection options for a programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyACM0" or "COM1")
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
    /// TCP socket connection (serial-over-network bridge)
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
}

impl Connection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyACM0` - Serial with default baud
    /// - `dev=/dev/ttyACM0:115200` - Serial with specified baud
    /// - `ip=host:port` - TCP connection
    /// - `/dev/ttyACM0` - bare device path, serial with default baud
    pub fn parse(s: &str) -> core::result::Result<Self, String> {
        if let Some(dev) = s.strip_prefix("dev=") {
            if let Some((device, baud_str)) = dev.rsplit_once(':') {
                let baud = baud_str
                    .parse()
                    .map_err(|_| format!("Invalid baud rate: {}", baud_str))?;
                Ok(Connection::Serial {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            } else {
                Ok(Connection::Serial {
                    device: dev.to_string(),
                    baud: None,
                })
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = ip
                .rsplit_once(':')
                .ok_or_else(|| "Missing port in ip= parameter".to_string())?;
            let port = port_str
                .parse()
                .map_err(|_| format!("Invalid port: {}", port_str))?;
            Ok(Connection::Tcp {
                host: host.to_string(),
                port,
            })
        } else if s.is_empty() || s.contains('=') {
            Err(format!(
                "Invalid connection string: {}. Use dev=..., ip=... or a device path",
                s
            ))
        } else {
            Ok(Connection::Serial {
                device: s.to_string(),
                baud: None,
            })
        }
    }

    /// Override the baud rate of a serial connection
    pub fn with_baud(self, baud: Option<u32>) -> Self {
        match self {
            Connection::Serial { device, baud: old } => Connection::Serial {
                device,
                baud: baud.or(old),
            },
            other => other,
        }
    }

    /// Open the transport described by this connection
    pub fn open(&self, timeout: Duration) -> Result<Box<dyn Transport + Send>> {
        match self {
            #[cfg(feature = "serial")]
            Connection::Serial { device, baud } => {
                let mut transport = serial::SerialTransport::open(device, *baud)?;
                transport.set_timeout(timeout)?;
                Ok(Box::new(transport))
            }
            #[cfg(not(feature = "serial"))]
            Connection::Serial { device, .. } => Err(Error::ConnectionFailed(format!(
                "serial support not compiled in, cannot open {}",
                device
            ))),
            Connection::Tcp { host, port } => {
                let transport = tcp::TcpTransport::connect(host, *port, timeout)?;
                Ok(Box::new(transport))
            }
        }
    }
}

#[cfg(feature = "serial")]
pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};

    /// Serial port transport
    pub struct SerialTransport {
        port: Option<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        /// Open a serial port with the specified baud rate
        ///
        /// If baud is `None`, uses [`DEFAULT_BAUD`].
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(DEFAULT_TIMEOUT)
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self { port: Some(port) })
        }

        /// Set the read timeout
        pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            if let Some(port) = self.port.as_mut() {
                port.set_timeout(timeout)?;
            }
            Ok(())
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let Some(port) = self.port.as_mut() else {
                return Ok(0);
            };
            loop {
                match port.write(data) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    other => return Ok(other?),
                }
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let Some(port) = self.port.as_mut() else {
                return Ok(0);
            };
            loop {
                match port.read(buf) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    other => return Ok(other?),
                }
            }
        }

        fn flush(&mut self) -> Result<()> {
            if let Some(port) = self.port.as_mut() {
                port.flush()?;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if let Some(mut port) = self.port.take() {
                port.flush()?;
                log::debug!("Closed serial port");
            }
            Ok(())
        }
    }
}

pub mod tcp {
    //! TCP socket transport implementation

    use super::*;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream};

    /// TCP socket transport
    pub struct TcpTransport {
        stream: TcpStream,
    }

    /// Handle that can shut a [`TcpTransport`] down from another thread
    ///
    /// Shutting down unblocks a pending read, which then fails with
    /// [`Error::TransportClosed`].
    pub struct TcpCloseHandle {
        stream: TcpStream,
    }

    impl TcpCloseHandle {
        /// Shut the connection down in both directions
        pub fn close(&self) -> Result<()> {
            match self.stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                other => Ok(other?),
            }
        }
    }

    impl TcpTransport {
        /// Connect to a programmer bridge at the specified host and port
        pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
            let addr = format!("{}:{}", host, port);
            log::info!("Connecting to programmer at {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

            let transport = Self::from_stream(stream, timeout)?;
            log::info!("Connected to programmer at {}", addr);
            Ok(transport)
        }

        /// Wrap an already connected stream
        pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
            // Set TCP_NODELAY to reduce latency
            stream.set_nodelay(true).map_err(|e| {
                Error::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;

            stream.set_read_timeout(Some(timeout)).map_err(|e| {
                Error::ConnectionFailed(format!("Failed to set read timeout: {}", e))
            })?;
            stream.set_write_timeout(Some(timeout)).map_err(|e| {
                Error::ConnectionFailed(format!("Failed to set write timeout: {}", e))
            })?;

            Ok(Self { stream })
        }

        /// Get a handle that can close this transport from elsewhere
        pub fn close_handle(&self) -> Result<TcpCloseHandle> {
            Ok(TcpCloseHandle {
                stream: self.stream.try_clone()?,
            })
        }
    }

    impl Transport for TcpTransport {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            loop {
                match self.stream.write(data) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(0),
                    other => return Ok(other?),
                }
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            loop {
                match self.stream.read(buf) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    other => return Ok(other?),
                }
            }
        }

        fn flush(&mut self) -> Result<()> {
            self.stream.flush()?;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            match self.stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                other => Ok(other?),
            }
        }
    }
}
