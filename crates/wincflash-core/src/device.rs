//! WINC programmer device implementation
//!
//! This module provides the `WincFlasher` struct which owns a transport and
//! speaks the request/acknowledgment protocol over it. Every exchange sends
//! one frame and then blocks until the complete, opcode-specific response
//! has been read.

use crate::error::{Error, Result};
use crate::protocol::*;
use crate::transport::{fill, send_all, Transport};

/// Upper bound on bytes collected while looking for the version token
const HELLO_RESPONSE_LIMIT: usize = 256;

/// WINC programmer session
///
/// Created once per flashing operation. The negotiated payload size is fixed
/// for the lifetime of the session and bounds every write and read chunk.
pub struct WincFlasher<T: Transport> {
    /// Transport layer (serial or TCP)
    transport: T,
    /// Maximum bytes per write/read exchange, as reported by the programmer
    payload_size: usize,
}

impl<T: Transport> WincFlasher<T> {
    /// Create a new session on an open transport
    ///
    /// Queries the maximum payload size and rejects programmers reporting
    /// less than [`MIN_PAYLOAD_SIZE`]. The HELLO handshake is not part of
    /// session setup; call [`WincFlasher::hello`] explicitly if the
    /// programmer version should be checked.
    pub fn new(transport: T) -> Result<Self> {
        let mut flasher = Self {
            transport,
            payload_size: 0,
        };

        let reported = flasher.query_max_payload_size()?;
        if reported < MIN_PAYLOAD_SIZE {
            log::error!(
                "winc: programmer reports {} as maximum payload size ({} is needed)",
                reported,
                MIN_PAYLOAD_SIZE
            );
            return Err(Error::PayloadTooSmall {
                reported,
                required: MIN_PAYLOAD_SIZE,
            });
        }

        flasher.payload_size = reported as usize;
        log::debug!("winc: Maximum payload size is {}", flasher.payload_size);

        Ok(flasher)
    }

    /// Negotiated payload size for this session
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the session and its transport
    pub fn close(mut self) -> Result<()> {
        log::debug!("winc: Closing session");
        self.transport.close()
    }

    /// Probe the programmer identity
    ///
    /// Reads the HELLO response and checks its last 6 bytes against
    /// [`SUPPORTED_VERSION`]. Stale bytes left in the receive path ahead of
    /// the token are discarded. A response shorter than a token is judged
    /// on what arrived before the stream went quiet.
    pub fn hello(&mut self) -> Result<()> {
        self.send(&Request::Hello)?;

        let token = self.read_version_token()?;
        if token.first() != Some(&b'v') {
            return Err(Error::NotResponding { found: token });
        }
        if token != SUPPORTED_VERSION {
            return Err(Error::VersionMismatch {
                expected: "v10000",
                found: token,
            });
        }

        log::debug!("winc: Programmer version {}", String::from_utf8_lossy(&token));
        Ok(())
    }

    /// Collect the HELLO response and keep its trailing token-sized window
    fn read_version_token(&mut self) -> Result<Vec<u8>> {
        let want = SUPPORTED_VERSION.len();
        let mut response = Vec::new();
        let mut buf = [0u8; 64];

        while response.len() < HELLO_RESPONSE_LIMIT {
            // Done once the trailing window starts like a token
            if response.len() >= want && response[response.len() - want] == b'v' {
                break;
            }
            match self.transport.read(&mut buf) {
                Ok(0) | Err(Error::Timeout) if !response.is_empty() => break,
                Ok(0) => {
                    return Err(Error::TransportClosed {
                        expected: want,
                        received: 0,
                    })
                }
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(e) => return Err(e),
            }
        }

        if response.len() > want {
            log::debug!(
                "winc: Discarding {} stale bytes before version token",
                response.len() - want
            );
        }
        let start = response.len().saturating_sub(want);
        Ok(response.split_off(start))
    }

    /// Ask the programmer for the largest payload it accepts per frame
    pub fn query_max_payload_size(&mut self) -> Result<u16> {
        self.send(&Request::MaxPayloadSize)?;

        let mut buf = [0u8; 2];
        fill(&mut self.transport, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Erase `length` bytes of flash starting at `address`
    pub fn erase(&mut self, address: u32, length: u32) -> Result<()> {
        self.send(&Request::Erase { address, length })?;
        log::info!("Erasing {} bytes from address 0x{:X}", length, address);
        self.await_ack(Opcode::Erase)
    }

    /// Program one chunk at `address`
    ///
    /// The chunk must be non-empty and no larger than the negotiated payload
    /// size.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > self.payload_size {
            return Err(Error::InvalidParameter(format!(
                "write of {} bytes, must be 1..={} bytes",
                data.len(),
                self.payload_size
            )));
        }

        self.send(&Request::Write { address, data })?;
        self.await_ack(Opcode::Write)
    }

    /// Read `length` bytes of flash starting at `address`
    pub fn read(&mut self, address: u32, length: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length as usize];
        self.read_into(address, &mut buf)?;
        Ok(buf)
    }

    /// Read `buf.len()` bytes of flash starting at `address` into `buf`
    pub fn read_into(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let length = u32::try_from(buf.len())
            .map_err(|_| Error::InvalidParameter(format!("read of {} bytes", buf.len())))?;

        self.send(&Request::Read { address, length })?;
        fill(&mut self.transport, buf)?;
        self.await_ack(Opcode::Read)
    }

    // ---- Protocol implementation ----

    /// Encode and send one request frame
    fn send(&mut self, request: &Request<'_>) -> Result<()> {
        let frame = request.encode()?;
        log::trace!("winc: -> {:?} ({} bytes)", request.opcode(), frame.len());
        send_all(&mut self.transport, &frame)
    }

    /// Read and check the 2-byte acknowledgment
    fn await_ack(&mut self, opcode: Opcode) -> Result<()> {
        let mut ack = [0u8; 2];
        fill(&mut self.transport, &mut ack)?;
        check_ack(opcode, &ack)
    }
}
