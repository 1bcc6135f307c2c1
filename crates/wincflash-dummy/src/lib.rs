//! wincflash-dummy - In-memory WINC programmer emulator for testing
//!
//! This crate provides a dummy programmer that decodes request frames and
//! answers them the way the programmer sketch does, backed by an emulated
//! flash array. It's useful for testing and development without real
//! hardware, and can inject faults the real device only shows on bad days.

use std::collections::VecDeque;

use wincflash_core::error::Result;
use wincflash_core::protocol::{
    FrameHeader, ACK, CMD_ERASE, CMD_HELLO, CMD_MAX_PAYLOAD_SIZE, CMD_READ, CMD_WRITE, HEADER_LEN,
    SUPPORTED_VERSION,
};
use wincflash_core::Transport;

/// Token sent instead of `OK` when the emulated programmer rejects a request
pub const ERROR_TOKEN: &[u8; 2] = b"ER";

/// Value of erased flash
const ERASED_VALUE: u8 = 0xFF;

/// Faults to inject into the emulated programmer
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Reject the write request with this zero-based index
    pub nack_write: Option<usize>,
    /// Flip the low bit of the byte at this address on every readback
    pub corrupt_read_at: Option<u32>,
    /// Stop answering after this many response bytes
    pub close_after: Option<usize>,
    /// Hand out at most this many bytes per read
    pub max_read: Option<usize>,
}

/// Configuration for the emulated programmer
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Flash size in bytes
    pub flash_size: usize,
    /// Maximum payload size reported to the host
    pub payload_size: u16,
    /// Version token answered to HELLO
    pub version: Vec<u8>,
    /// Injected faults
    pub faults: Faults,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            flash_size: 512 * 1024, // WINC1500, 4 Mbit
            payload_size: 4096,
            version: SUPPORTED_VERSION.to_vec(),
            faults: Faults::default(),
        }
    }
}

/// Emulated WINC programmer
///
/// Implements [`Transport`]: bytes written to it are parsed as request
/// frames, and responses are queued for the host to read.
pub struct EmulatedWinc {
    config: EmulatorConfig,
    flash: Vec<u8>,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    bytes_sent: usize,
    writes_seen: usize,
    requests: Vec<FrameHeader>,
    closed: bool,
}

impl EmulatedWinc {
    /// Create a new emulated programmer with the given configuration
    pub fn new(config: EmulatorConfig) -> Self {
        let flash = vec![ERASED_VALUE; config.flash_size];
        Self {
            config,
            flash,
            rx: Vec::new(),
            tx: VecDeque::new(),
            bytes_sent: 0,
            writes_seen: 0,
            requests: Vec::new(),
            closed: false,
        }
    }

    /// Create a new emulated programmer with default configuration
    pub fn new_default() -> Self {
        Self::new(EmulatorConfig::default())
    }

    /// Get the emulated flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Fill the emulated flash with `value`, as if left over from earlier use
    pub fn fill_flash(&mut self, value: u8) {
        self.flash.fill(value);
    }

    /// Every request header received so far, in order
    pub fn requests(&self) -> &[FrameHeader] {
        &self.requests
    }

    /// Whether the host closed the stream
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bounds-checked flash range
    fn range(&self, address: u32, len: u32) -> Option<core::ops::Range<usize>> {
        let start = address as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.flash.len()).then_some(start..end)
    }

    fn reply(&mut self, ok: bool) {
        self.tx.extend(if ok { ACK } else { ERROR_TOKEN });
    }

    /// Parse and answer every complete frame in the receive buffer
    fn process(&mut self) {
        while let Some(hdr) = FrameHeader::parse(&self.rx) {
            let frame_len = HEADER_LEN + hdr.payload_len as usize;
            if self.rx.len() < frame_len {
                break;
            }
            let payload: Vec<u8> = self.rx.drain(..frame_len).skip(HEADER_LEN).collect();
            self.requests.push(hdr);
            self.handle(hdr, &payload);
        }
    }

    fn handle(&mut self, hdr: FrameHeader, payload: &[u8]) {
        log::trace!(
            "dummy: opcode 0x{:02X} addr 0x{:08X} value {} len {}",
            hdr.opcode,
            hdr.address,
            hdr.value,
            hdr.payload_len
        );

        match hdr.opcode {
            CMD_HELLO => {
                let version = self.config.version.clone();
                self.tx.extend(version);
            }
            CMD_MAX_PAYLOAD_SIZE => {
                self.tx.extend(self.config.payload_size.to_be_bytes());
            }
            CMD_ERASE => match self.range(hdr.address, hdr.value) {
                Some(r) => {
                    self.flash[r].fill(ERASED_VALUE);
                    self.reply(true);
                }
                None => self.reply(false),
            },
            CMD_WRITE => {
                let index = self.writes_seen;
                self.writes_seen += 1;

                let range = self.range(hdr.address, payload.len() as u32);
                let too_big = payload.len() > self.config.payload_size as usize;
                match range {
                    Some(r) if !too_big && self.config.faults.nack_write != Some(index) => {
                        // Programming can only clear bits
                        for (cell, byte) in self.flash[r].iter_mut().zip(payload) {
                            *cell &= *byte;
                        }
                        self.reply(true);
                    }
                    _ => self.reply(false),
                }
            }
            CMD_READ => match self.range(hdr.address, hdr.value) {
                Some(r) => {
                    let start = r.start;
                    let mut data = self.flash[r].to_vec();
                    if let Some(addr) = self.config.faults.corrupt_read_at {
                        if let Some(b) = (addr as usize)
                            .checked_sub(start)
                            .and_then(|i| data.get_mut(i))
                        {
                            *b ^= 0x01;
                        }
                    }
                    self.tx.extend(data);
                    self.reply(true);
                }
                None => {
                    // Keep the response shape so the host stays in sync
                    self.tx.extend(std::iter::repeat(0).take(hdr.value as usize));
                    self.reply(false);
                }
            },
            other => {
                log::debug!("dummy: unknown opcode 0x{:02X}", other);
                self.reply(false);
            }
        }
    }
}

impl Transport for EmulatedWinc {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }
        self.rx.extend_from_slice(data);
        self.process();
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }

        let mut n = buf.len().min(self.tx.len());
        if let Some(max) = self.config.faults.max_read {
            n = n.min(max);
        }
        if let Some(limit) = self.config.faults.close_after {
            n = n.min(limit.saturating_sub(self.bytes_sent));
        }

        for (slot, byte) in buf.iter_mut().zip(self.tx.drain(..n)) {
            *slot = byte;
        }
        self.bytes_sent += n;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wincflash_core::{
        flash_image, read_image, Error, ErrorCategory, FirmwareImage, NoProgress, WincFlasher,
    };

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn emulator(payload_size: u16, faults: Faults) -> EmulatedWinc {
        EmulatedWinc::new(EmulatorConfig {
            payload_size,
            faults,
            ..EmulatorConfig::default()
        })
    }

    #[test]
    fn test_flash_and_verify() {
        let mut flasher = WincFlasher::new(emulator(1024, Faults::default())).unwrap();
        let image = FirmwareImage::primary(pattern(2500)).unwrap();

        let stats = flash_image(&mut flasher, &image, &mut NoProgress).unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(&flasher.transport_mut().flash()[..2500], image.data());

        let opcodes: Vec<_> = flasher
            .transport_mut()
            .requests()
            .iter()
            .map(|h| (h.opcode, h.address, h.value))
            .collect();
        assert_eq!(
            opcodes,
            [
                (CMD_MAX_PAYLOAD_SIZE, 0, 0),
                (CMD_ERASE, 0, 2500),
                (CMD_WRITE, 0, 0),
                (CMD_WRITE, 1024, 0),
                (CMD_WRITE, 2048, 0),
                (CMD_READ, 0, 1024),
                (CMD_READ, 1024, 1024),
                (CMD_READ, 2048, 452),
            ]
        );
    }

    #[test]
    fn test_flash_over_dirty_flash() {
        // Writes can only clear bits, so this only verifies if the erase ran
        let mut winc = emulator(1024, Faults::default());
        winc.fill_flash(0x00);
        let mut flasher = WincFlasher::new(winc).unwrap();
        let image = FirmwareImage::new(0x1000, pattern(3000)).unwrap();

        flash_image(&mut flasher, &image, &mut NoProgress).unwrap();
        let flash = flasher.transport_mut().flash();
        assert_eq!(&flash[0x1000..0x1000 + 3000], image.data());
        // Outside the image is untouched
        assert_eq!(flash[0x0FFF], 0x00);
        assert_eq!(flash[0x1000 + 3000], 0x00);
    }

    #[test]
    fn test_flash_twice_same_result() {
        let mut flasher = WincFlasher::new(emulator(1024, Faults::default())).unwrap();
        let image = FirmwareImage::primary(pattern(5000)).unwrap();

        let first = flash_image(&mut flasher, &image, &mut NoProgress).unwrap();
        let second = flash_image(&mut flasher, &image, &mut NoProgress).unwrap();
        assert_eq!(first, second);

        let data = read_image(&mut flasher, 0, 5000, &mut NoProgress).unwrap();
        assert_eq!(data, image.data());
    }

    #[test]
    fn test_small_payload_rejected_before_erase() {
        let winc = emulator(512, Faults::default());
        match WincFlasher::new(winc) {
            Err(e) => {
                assert_eq!(e.category(), ErrorCategory::Capability);
            }
            Ok(_) => panic!("session must not be created"),
        }
    }

    #[test]
    fn test_write_nack_aborts() {
        let faults = Faults {
            nack_write: Some(2),
            ..Faults::default()
        };
        let mut flasher = WincFlasher::new(emulator(1024, faults)).unwrap();
        let image = FirmwareImage::primary(pattern(5000)).unwrap();

        match flash_image(&mut flasher, &image, &mut NoProgress) {
            Err(Error::AckMismatch { opcode, found }) => {
                assert_eq!(opcode, "write");
                assert_eq!(&found, ERROR_TOKEN);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let writes = flasher
            .transport_mut()
            .requests()
            .iter()
            .filter(|h| h.opcode == CMD_WRITE)
            .count();
        assert_eq!(writes, 3);
        assert!(!flasher
            .transport_mut()
            .requests()
            .iter()
            .any(|h| h.opcode == CMD_READ));
    }

    #[test]
    fn test_corrupt_readback_reports_offset() {
        let faults = Faults {
            corrupt_read_at: Some(1500),
            ..Faults::default()
        };
        let mut flasher = WincFlasher::new(emulator(1024, faults)).unwrap();
        let image = FirmwareImage::primary(pattern(2500)).unwrap();

        let err = flash_image(&mut flasher, &image, &mut NoProgress).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Verification);
        assert!(matches!(
            err,
            Error::VerifyMismatch {
                offset: 1500,
                address: 1500,
                ..
            }
        ));
    }

    #[test]
    fn test_stream_closed_mid_ack() {
        // 2 bytes payload size answer, 2 bytes erase ack, then one byte of
        // the first write ack
        let faults = Faults {
            close_after: Some(5),
            ..Faults::default()
        };
        let mut flasher = WincFlasher::new(emulator(1024, faults)).unwrap();
        let image = FirmwareImage::primary(pattern(100)).unwrap();

        let err = flash_image(&mut flasher, &image, &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::TransportClosed {
                expected: 2,
                received: 1
            }
        ));
    }

    #[test]
    fn test_fragmented_responses() {
        let faults = Faults {
            max_read: Some(3),
            ..Faults::default()
        };
        let mut flasher = WincFlasher::new(emulator(1024, faults)).unwrap();
        let image = FirmwareImage::primary(pattern(4096)).unwrap();
        flash_image(&mut flasher, &image, &mut NoProgress).unwrap();
    }

    #[test]
    fn test_hello() {
        let mut flasher = WincFlasher::new(EmulatedWinc::new_default()).unwrap();
        flasher.hello().unwrap();

        let mut flasher = WincFlasher::new(EmulatedWinc::new(EmulatorConfig {
            version: b"v19999".to_vec(),
            ..EmulatorConfig::default()
        }))
        .unwrap();
        assert!(matches!(
            flasher.hello(),
            Err(Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_range_erase() {
        let mut flasher = WincFlasher::new(EmulatedWinc::new_default()).unwrap();
        assert!(matches!(
            flasher.erase(0x0008_0000, 16),
            Err(Error::AckMismatch { opcode: "erase", .. })
        ));
    }

    #[test]
    fn test_close() {
        let mut flasher = WincFlasher::new(EmulatedWinc::new_default()).unwrap();
        flasher.transport_mut().close().unwrap();
        assert!(flasher.transport_mut().is_closed());
        assert!(matches!(
            flasher.erase(0, 16),
            Err(Error::TransportClosed { .. })
        ));
    }
}
