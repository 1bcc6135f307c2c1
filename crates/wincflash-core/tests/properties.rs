//! Property tests for framing, exact reads and chunk planning.

use proptest::prelude::*;
use wincflash_core::protocol::{encode_frame, FrameHeader, HEADER_LEN};
use wincflash_core::transport::{fill_exact, Transport};
use wincflash_core::{ChunkPlan, Error, Result};

/// Transport that hands out a fixed byte stream in caller-chosen slices
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    sizes: Vec<usize>,
    reads: usize,
}

impl Transport for Trickle {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let step = self.sizes[self.reads % self.sizes.len()];
        self.reads += 1;
        let n = step.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

proptest! {
    /// Encoding then parsing gives back the header fields, and the length
    /// field always matches the attached payload.
    #[test]
    fn frame_header_round_trip(
        opcode in any::<u8>(),
        address in any::<u32>(),
        value in any::<u32>(),
        payload in proptest::option::of(proptest::collection::vec(any::<u8>(), 1..=2048)),
    ) {
        let frame = encode_frame(opcode, address, value, payload.as_deref()).unwrap();
        let hdr = FrameHeader::parse(&frame).unwrap();

        prop_assert_eq!(hdr.opcode, opcode);
        prop_assert_eq!(hdr.address, address);
        prop_assert_eq!(hdr.value, value);

        let expected_len = payload.as_ref().map_or(0, |p| p.len());
        prop_assert_eq!(hdr.payload_len as usize, expected_len);
        prop_assert_eq!(frame.len(), HEADER_LEN + expected_len);
        prop_assert_eq!(&frame[HEADER_LEN..], payload.as_deref().unwrap_or(&[]));
    }

    /// With enough bytes available, fill returns exactly n of them no matter
    /// how the underlying reads are split up.
    #[test]
    fn fill_returns_exact_count(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        extra in 0usize..64,
        sizes in proptest::collection::vec(1usize..32, 1..8),
    ) {
        let n = data.len();
        let mut stream = data.clone();
        stream.extend(std::iter::repeat(0xA5).take(extra));
        let mut t = Trickle { data: stream, pos: 0, sizes, reads: 0 };

        let got = fill_exact(&mut t, n).unwrap();
        prop_assert_eq!(got, data);
    }

    /// When the stream ends early, fill fails instead of returning a short
    /// buffer.
    #[test]
    fn fill_never_returns_short(
        available in 0usize..256,
        missing in 1usize..64,
        sizes in proptest::collection::vec(1usize..32, 1..8),
    ) {
        let mut t = Trickle { data: vec![0x5A; available], pos: 0, sizes, reads: 0 };

        match fill_exact(&mut t, available + missing) {
            Err(Error::TransportClosed { expected, received }) => {
                prop_assert_eq!(expected, available + missing);
                prop_assert_eq!(received, available);
            }
            other => prop_assert!(false, "unexpected result: {:?}", other),
        }
    }

    /// Chunks tile the range exactly: offsets 0, P, 2P, ... and a final
    /// chunk of L mod P bytes (or P when L is a multiple of P).
    #[test]
    fn chunk_plan_covers_range(
        base in 0u32..0x0100_0000,
        len in 1usize..20_000,
        size in 1024usize..4096,
    ) {
        let plan = ChunkPlan::new(base, len, size).unwrap();
        let chunks: Vec<_> = plan.chunks().collect();

        prop_assert_eq!(chunks.len(), plan.len());
        for (i, c) in chunks.iter().enumerate() {
            prop_assert_eq!(c.index, i);
            prop_assert_eq!(c.offset, i * size);
            prop_assert_eq!(c.address, base + (i * size) as u32);
        }

        let last = chunks.last().unwrap();
        let expected_last = if len % size == 0 { size } else { len % size };
        prop_assert_eq!(last.len, expected_last);
        prop_assert_eq!(chunks.iter().map(|c| c.len).sum::<usize>(), len);

        // A second pass, as used for readback, is identical
        let again: Vec<_> = plan.chunks().collect();
        prop_assert_eq!(chunks, again);
    }
}
