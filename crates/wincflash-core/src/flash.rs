//! Full-image flash operations
//!
//! A flash runs strictly in order: erase the whole target range once, write
//! every chunk, read every chunk back with the same chunk boundaries, then
//! compare the readback against the image. [`FlashState`] tracks the phases
//! and refuses any transition that would skip or reorder one.

use core::fmt;
use core::ops::Range;

use crate::device::WincFlasher;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Base address of the primary firmware image
pub const PRIMARY_IMAGE_BASE: u32 = 0x0000_0000;

/// Size of the 32-bit address space
const ADDRESS_SPACE: u64 = 1 << 32;

/// Check that `[base, base + len)` is a non-empty range inside the address
/// space whose length still fits the 32-bit erase length field
fn check_range(base: u32, len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::InvalidParameter("empty flash range".into()));
    }
    if len as u64 > u32::MAX as u64 || base as u64 + len as u64 > ADDRESS_SPACE {
        return Err(Error::InvalidParameter(format!(
            "{} bytes at 0x{:08X} run past the end of the address space",
            len, base
        )));
    }
    Ok(())
}

/// An immutable firmware image and the address it is flashed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    base: u32,
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Create an image to be flashed at `base`
    ///
    /// The image must be non-empty and fit in the 32-bit address space.
    pub fn new(base: u32, data: Vec<u8>) -> Result<Self> {
        check_range(base, data.len())?;
        Ok(Self { base, data })
    }

    /// Create the primary image, flashed at [`PRIMARY_IMAGE_BASE`]
    pub fn primary(data: Vec<u8>) -> Result<Self> {
        Self::new(PRIMARY_IMAGE_BASE, data)
    }

    /// Target base address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Image contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false, images are never empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One write/read exchange worth of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the plan
    pub index: usize,
    /// Offset from the start of the image
    pub offset: usize,
    /// Absolute flash address
    pub address: u32,
    /// Length in bytes
    pub len: usize,
}

impl Chunk {
    /// Byte range of this chunk within the image
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Split of a flash range into payload-sized chunks
///
/// Chunks start at offsets `0, P, 2P, ...` and every chunk but the last is
/// `P` bytes long. Writes and readback iterate the same plan, so their
/// addresses and lengths line up one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    base: u32,
    len: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plan `len` bytes at `base` in chunks of at most `chunk_size` bytes
    pub fn new(base: u32, len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidParameter("chunk size must not be zero".into()));
        }
        check_range(base, len)?;
        Ok(Self {
            base,
            len,
            chunk_size,
        })
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.len.div_ceil(self.chunk_size)
    }

    /// Plans always hold at least one chunk
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total bytes covered
    pub fn total_bytes(&self) -> usize {
        self.len
    }

    /// Iterate the chunks in address order
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.len)
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(index, offset)| Chunk {
                index,
                offset,
                address: self.base + offset as u32,
                len: self.chunk_size.min(self.len - offset),
            })
    }
}

/// Phase of a flash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    Erasing,
    Writing { chunk: usize },
    Reading { chunk: usize },
    Verifying,
    Done,
    Failed,
}

impl FlashState {
    /// Whether the operation has finished, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, FlashState::Done | FlashState::Failed)
    }

    /// Whether `next` may follow `self` in a flash of `chunks` chunks
    pub fn can_advance_to(self, next: FlashState, chunks: usize) -> bool {
        use FlashState::*;

        let last = chunks.saturating_sub(1);
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Erasing) => true,
            (Erasing, Writing { chunk: 0 }) => chunks > 0,
            (Writing { chunk: a }, Writing { chunk: b }) => b == a + 1 && b < chunks,
            (Writing { chunk }, Reading { chunk: 0 }) => chunk == last,
            (Reading { chunk: a }, Reading { chunk: b }) => b == a + 1 && b < chunks,
            (Reading { chunk }, Verifying) => chunk == last,
            (Verifying, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashState::Idle => write!(f, "idle"),
            FlashState::Erasing => write!(f, "erasing"),
            FlashState::Writing { chunk } => write!(f, "writing chunk {}", chunk),
            FlashState::Reading { chunk } => write!(f, "reading chunk {}", chunk),
            FlashState::Verifying => write!(f, "verifying"),
            FlashState::Done => write!(f, "done"),
            FlashState::Failed => write!(f, "failed"),
        }
    }
}

/// Guarded phase tracker for one flash operation
#[derive(Debug)]
pub struct FlashMachine {
    state: FlashState,
    chunks: usize,
}

impl FlashMachine {
    /// Start in [`FlashState::Idle`] for a plan of `chunks` chunks
    pub fn new(chunks: usize) -> Self {
        Self {
            state: FlashState::Idle,
            chunks,
        }
    }

    /// Current phase
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Move to `next`, or fail if that would skip or reorder a phase
    pub fn advance(&mut self, next: FlashState) -> Result<()> {
        if !self.state.can_advance_to(next, self.chunks) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        log::trace!("winc: {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Statistics from a completed flash operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashStats {
    pub bytes_erased: usize,
    pub bytes_written: usize,
    pub bytes_read: usize,
    pub chunks: usize,
}

/// Callback for progress reporting during flash operations
///
/// Purely observational: nothing a reporter does changes the order or
/// outcome of the operation.
pub trait FlashProgress {
    /// Called on every phase change
    fn state_changed(&mut self, _state: FlashState) {}

    /// Called when the erase is sent
    fn erasing(&mut self, address: u32, bytes: usize);

    /// Called when starting to write chunks
    fn writing(&mut self, total_bytes: usize);

    /// Called after each acknowledged chunk write
    fn write_progress(&mut self, bytes_written: usize);

    /// Called when starting to read chunks back
    fn reading(&mut self, total_bytes: usize);

    /// Called after each chunk read
    fn read_progress(&mut self, bytes_read: usize);

    /// Called before comparing readback against the image
    fn verifying(&mut self);

    /// Called when the operation is complete
    fn complete(&mut self, stats: &FlashStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn erasing(&mut self, _address: u32, _bytes: usize) {}
    fn writing(&mut self, _total_bytes: usize) {}
    fn write_progress(&mut self, _bytes_written: usize) {}
    fn reading(&mut self, _total_bytes: usize) {}
    fn read_progress(&mut self, _bytes_read: usize) {}
    fn verifying(&mut self) {}
    fn complete(&mut self, _stats: &FlashStats) {}
}

/// Find the first offset where `found` differs from `expected`
pub fn first_mismatch(expected: &[u8], found: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(found.iter())
        .position(|(e, f)| e != f)
        .or_else(|| (expected.len() != found.len()).then(|| expected.len().min(found.len())))
}

/// Flash a complete image: erase, write, read back and verify
///
/// Any failure aborts the operation. The device may then hold a partially
/// written image; a retry must start again from the erase.
pub fn flash_image<T: Transport, P: FlashProgress + ?Sized>(
    flasher: &mut WincFlasher<T>,
    image: &FirmwareImage,
    progress: &mut P,
) -> Result<FlashStats> {
    let plan = ChunkPlan::new(image.base(), image.len(), flasher.payload_size())?;
    let mut machine = FlashMachine::new(plan.len());

    match run_flash(flasher, image, &plan, &mut machine, progress) {
        Ok(stats) => {
            progress.complete(&stats);
            Ok(stats)
        }
        Err(e) => {
            log::error!("winc: Flash failed while {}: {}", machine.state(), e);
            if machine.advance(FlashState::Failed).is_ok() {
                progress.state_changed(FlashState::Failed);
            }
            Err(e)
        }
    }
}

fn run_flash<T: Transport, P: FlashProgress + ?Sized>(
    flasher: &mut WincFlasher<T>,
    image: &FirmwareImage,
    plan: &ChunkPlan,
    machine: &mut FlashMachine,
    progress: &mut P,
) -> Result<FlashStats> {
    let data = image.data();
    let total = data.len();
    let mut stats = FlashStats {
        chunks: plan.len(),
        ..FlashStats::default()
    };

    // Erase the whole range once, before any write
    enter(machine, progress, FlashState::Erasing)?;
    progress.erasing(image.base(), total);
    flasher.erase(image.base(), total as u32)?;
    stats.bytes_erased = total;

    // Write every chunk, each one acknowledged before the next
    progress.writing(total);
    for chunk in plan.chunks() {
        enter(machine, progress, FlashState::Writing { chunk: chunk.index })?;
        log::debug!("Flashing: {}%", chunk.offset * 100 / total);
        flasher.write(chunk.address, &data[chunk.range()])?;
        stats.bytes_written += chunk.len;
        progress.write_progress(stats.bytes_written);
    }

    // Read back with identical chunk boundaries into a pre-sized buffer
    progress.reading(total);
    let mut readback = vec![0u8; total];
    for chunk in plan.chunks() {
        enter(machine, progress, FlashState::Reading { chunk: chunk.index })?;
        flasher.read_into(chunk.address, &mut readback[chunk.range()])?;
        stats.bytes_read += chunk.len;
        progress.read_progress(stats.bytes_read);
    }

    enter(machine, progress, FlashState::Verifying)?;
    progress.verifying();
    if let Some(offset) = first_mismatch(data, &readback) {
        return Err(Error::VerifyMismatch {
            offset,
            address: image.base() + offset as u32,
            expected: data[offset],
            found: readback[offset],
        });
    }

    enter(machine, progress, FlashState::Done)?;
    log::info!(
        "winc: Flashed and verified {} bytes at 0x{:08X} in {} chunks",
        total,
        image.base(),
        stats.chunks
    );
    Ok(stats)
}

fn enter<P: FlashProgress + ?Sized>(
    machine: &mut FlashMachine,
    progress: &mut P,
    next: FlashState,
) -> Result<()> {
    machine.advance(next)?;
    progress.state_changed(next);
    Ok(())
}

/// Read `len` bytes starting at `base`, chunked by the session payload size
pub fn read_image<T: Transport, P: FlashProgress + ?Sized>(
    flasher: &mut WincFlasher<T>,
    base: u32,
    len: usize,
    progress: &mut P,
) -> Result<Vec<u8>> {
    let plan = ChunkPlan::new(base, len, flasher.payload_size())?;

    progress.reading(len);
    let mut buf = vec![0u8; len];
    let mut bytes_read = 0;
    for chunk in plan.chunks() {
        flasher.read_into(chunk.address, &mut buf[chunk.range()])?;
        bytes_read += chunk.len;
        progress.read_progress(bytes_read);
    }
    Ok(buf)
}
