//! Pixel buffers shared with the server
//!
//! The client draws into memory the server can read directly: a DMA-buf
//! exported by DRI3 for the Present path, or a System-V shared memory
//! segment for the MIT-SHM path. Writes must be bracketed by
//! [`PixelBuffer::begin_access`] / [`PixelBuffer::end_access`].

#[cfg(target_os = "linux")]
pub mod dmabuf;
#[cfg(unix)]
pub mod shm;

#[cfg(target_os = "linux")]
pub use dmabuf::DmaBuffer;
#[cfg(unix)]
pub use shm::ShmSegment;

use crate::protocol::ClientResult;

/// Bytes per pixel for depth 24/32 images
pub const BYTES_PER_PIXEL: usize = 4;

/// A 32-bit-per-pixel image the CPU writes and the server reads
pub trait PixelBuffer {
    fn width(&self) -> u16;

    fn height(&self) -> u16;

    /// Bytes per row
    fn stride(&self) -> usize {
        self.width() as usize * BYTES_PER_PIXEL
    }

    fn pixels_mut(&mut self) -> &mut [u8];

    /// Start of a CPU write burst
    fn begin_access(&mut self) -> ClientResult<()> {
        Ok(())
    }

    /// End of a CPU write burst; the server may read again afterwards
    fn end_access(&mut self) -> ClientResult<()> {
        Ok(())
    }

    /// Run `f` over the pixels inside a begin/end bracket
    fn with_cpu_access(&mut self, f: &mut dyn FnMut(&mut [u8])) -> ClientResult<()> {
        self.begin_access()?;
        f(self.pixels_mut());
        self.end_access()
    }
}

/// Heap buffer nobody else can see. Stands in for shared memory when no
/// server is involved.
#[derive(Debug, Clone)]
pub struct MemoryBuffer {
    width: u16,
    height: u16,
    data: Vec<u8>,
    open_access: bool,
    completed_accesses: usize,
}

impl MemoryBuffer {
    pub fn new(width: u16, height: u16) -> Self {
        MemoryBuffer {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            open_access: false,
            completed_accesses: 0,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Number of finished begin/end brackets
    pub fn completed_accesses(&self) -> usize {
        self.completed_accesses
    }
}

impl PixelBuffer for MemoryBuffer {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn begin_access(&mut self) -> ClientResult<()> {
        assert!(!self.open_access, "begin_access called twice");
        self.open_access = true;
        Ok(())
    }

    fn end_access(&mut self) -> ClientResult<()> {
        assert!(self.open_access, "end_access without begin_access");
        self.open_access = false;
        self.completed_accesses += 1;
        Ok(())
    }
}
