//! WINC programmer wire protocol
//!
//! Every request is a length-prefixed frame with an 11-byte big-endian
//! header followed by an optional payload:
//!
//! ```text
//! +--------+-----------+-----------+-------------+-----------------+
//! | opcode | address   | value     | payload len | payload         |
//! | 1 byte | 4 bytes   | 4 bytes   | 2 bytes     | payload len     |
//! +--------+-----------+-----------+-------------+-----------------+
//! ```
//!
//! There is no checksum or terminator. Erase, write and read are answered
//! with the two ASCII bytes `OK`; the payload size query is answered with a
//! 16-bit big-endian integer.

use crate::error::{Error, Result};

/// Read a block of flash
pub const CMD_READ: u8 = 0x01;
/// Program a block of flash
pub const CMD_WRITE: u8 = 0x02;
/// Erase a block of flash
pub const CMD_ERASE: u8 = 0x03;
/// Query the maximum payload the programmer accepts per frame
pub const CMD_MAX_PAYLOAD_SIZE: u8 = 0x50;
/// Identity/version probe
pub const CMD_HELLO: u8 = 0x99;

/// Fixed address sent with HELLO
pub const HELLO_ADDRESS: u32 = 0x1122_3344;
/// Fixed value sent with HELLO
pub const HELLO_VALUE: u32 = 0x5566_7788;

/// The only programmer version we speak
pub const SUPPORTED_VERSION: &[u8; 6] = b"v10000";

/// Acknowledgment token
pub const ACK: &[u8; 2] = b"OK";

/// Smallest payload size a session can be built on
pub const MIN_PAYLOAD_SIZE: u16 = 1024;

/// Size of the fixed frame header
pub const HEADER_LEN: usize = 11;

/// Largest payload a single frame can carry
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Read = CMD_READ,
    Write = CMD_WRITE,
    Erase = CMD_ERASE,
    MaxPayloadSize = CMD_MAX_PAYLOAD_SIZE,
    Hello = CMD_HELLO,
}

impl Opcode {
    /// Short name used in log and error messages
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Read => "read",
            Opcode::Write => "write",
            Opcode::Erase => "erase",
            Opcode::MaxPayloadSize => "max payload size",
            Opcode::Hello => "hello",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        match value {
            CMD_READ => Ok(Opcode::Read),
            CMD_WRITE => Ok(Opcode::Write),
            CMD_ERASE => Ok(Opcode::Erase),
            CMD_MAX_PAYLOAD_SIZE => Ok(Opcode::MaxPayloadSize),
            CMD_HELLO => Ok(Opcode::Hello),
            other => Err(other),
        }
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u8,
    pub address: u32,
    pub value: u32,
    pub payload_len: u16,
}

impl FrameHeader {
    /// Serialize the header into its 11-byte wire form
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.opcode;
        buf[1..5].copy_from_slice(&self.address.to_be_bytes());
        buf[5..9].copy_from_slice(&self.value.to_be_bytes());
        buf[9..11].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Parse a header from the start of `bytes`
    ///
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let hdr: &[u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self {
            opcode: hdr[0],
            address: u32::from_be_bytes([hdr[1], hdr[2], hdr[3], hdr[4]]),
            value: u32::from_be_bytes([hdr[5], hdr[6], hdr[7], hdr[8]]),
            payload_len: u16::from_be_bytes([hdr[9], hdr[10]]),
        })
    }
}

/// A request to the programmer
///
/// The wire `value` field means different things per opcode (a length for
/// erase/read, nothing for write and the payload size query). Each variant
/// only carries the fields that mean something for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Identity/version probe with fixed sentinel fields
    Hello,
    /// Capability discovery
    MaxPayloadSize,
    /// Erase `length` bytes starting at `address`
    Erase { address: u32, length: u32 },
    /// Program `data` at `address`
    Write { address: u32, data: &'a [u8] },
    /// Read `length` bytes starting at `address`
    Read { address: u32, length: u32 },
}

impl Request<'_> {
    /// Opcode this request is sent with
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Hello => Opcode::Hello,
            Request::MaxPayloadSize => Opcode::MaxPayloadSize,
            Request::Erase { .. } => Opcode::Erase,
            Request::Write { .. } => Opcode::Write,
            Request::Read { .. } => Opcode::Read,
        }
    }

    /// Payload attached to the frame, if any
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Request::Write { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Encode the request into a complete frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (address, value) = match *self {
            Request::Hello => (HELLO_ADDRESS, HELLO_VALUE),
            Request::MaxPayloadSize => (0, 0),
            Request::Erase { address, length } => (address, length),
            Request::Write { address, .. } => (address, 0),
            Request::Read { address, length } => (address, length),
        };
        encode_frame(self.opcode() as u8, address, value, self.payload())
    }
}

/// Encode a frame: header followed by the raw payload bytes
///
/// An absent payload is encoded with a length of 0. A payload that is
/// present must be between 1 and [`MAX_FRAME_PAYLOAD`] bytes so the length
/// field always describes it.
pub fn encode_frame(opcode: u8, address: u32, value: u32, payload: Option<&[u8]>) -> Result<Vec<u8>> {
    let payload_len = match payload {
        None => 0,
        Some([]) => {
            return Err(Error::InvalidParameter(format!(
                "empty payload attached to opcode 0x{:02X}",
                opcode
            )));
        }
        Some(p) if p.len() > MAX_FRAME_PAYLOAD => {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds the {} byte frame limit",
                p.len(),
                MAX_FRAME_PAYLOAD
            )));
        }
        Some(p) => p.len() as u16,
    };
    let payload = payload.unwrap_or_default();

    let header = FrameHeader {
        opcode,
        address,
        value,
        payload_len,
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Check an acknowledgment token
///
/// Anything other than exactly `OK` is a protocol failure carrying the
/// offending bytes.
pub fn check_ack(opcode: Opcode, bytes: &[u8]) -> Result<()> {
    if bytes == ACK {
        return Ok(());
    }

    let mut found = [0u8; 2];
    let n = bytes.len().min(2);
    found[..n].copy_from_slice(&bytes[..n]);
    Err(Error::AckMismatch {
        opcode: opcode.name(),
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_write_frame() {
        let frame = Request::Write {
            address: 0x0000_0400,
            data: &[0xAA, 0xBB, 0xCC],
        }
        .encode()
        .unwrap();

        assert_eq!(
            frame,
            [0x02, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn test_encode_hello_frame() {
        let frame = Request::Hello.encode().unwrap();
        assert_eq!(
            frame,
            [0x99, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_read_and_erase_carry_length() {
        let frame = Request::Read {
            address: 0x0000_0800,
            length: 452,
        }
        .encode()
        .unwrap();
        let hdr = FrameHeader::parse(&frame).unwrap();
        assert_eq!(hdr.opcode, CMD_READ);
        assert_eq!(hdr.address, 0x800);
        assert_eq!(hdr.value, 452);
        assert_eq!(hdr.payload_len, 0);
        assert_eq!(frame.len(), HEADER_LEN);

        let frame = Request::Erase {
            address: 0,
            length: 2500,
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[5..9], &2500u32.to_be_bytes());
    }

    #[test]
    fn test_encode_rejects_bad_payloads() {
        assert!(matches!(
            Request::Write {
                address: 0,
                data: &[]
            }
            .encode(),
            Err(Error::InvalidParameter(_))
        ));

        let big = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        assert!(encode_frame(CMD_WRITE, 0, 0, Some(&big)).is_err());
    }

    #[test]
    fn test_header_parse_short() {
        assert_eq!(FrameHeader::parse(&[0x01, 0x02]), None);
    }

    #[test]
    fn test_opcode_try_from() {
        assert_eq!(Opcode::try_from(0x50), Ok(Opcode::MaxPayloadSize));
        assert_eq!(Opcode::try_from(0x42), Err(0x42));
    }

    #[test]
    fn test_check_ack() {
        assert!(check_ack(Opcode::Write, b"OK").is_ok());

        match check_ack(Opcode::Write, b"NO") {
            Err(Error::AckMismatch { opcode, found }) => {
                assert_eq!(opcode, "write");
                assert_eq!(&found, b"NO");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // Lowercase is not an ack either
        assert!(check_ack(Opcode::Erase, b"ok").is_err());
        assert!(check_ack(Opcode::Erase, b"OKK").is_err());
    }
}
