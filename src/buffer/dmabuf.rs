//! DMA-buf backed pixel buffer (Present path)

use super::{PixelBuffer, BYTES_PER_PIXEL};
use crate::protocol::{ClientError, ClientResult};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr::NonNull;

/// `struct dma_buf_sync` from linux/dma-buf.h
#[repr(C)]
pub struct DmaBufSync {
    pub flags: u64,
}

pub const DMA_BUF_SYNC_READ: u64 = 1 << 0;
pub const DMA_BUF_SYNC_WRITE: u64 = 1 << 1;
pub const DMA_BUF_SYNC_START: u64 = 0;
pub const DMA_BUF_SYNC_END: u64 = 1 << 2;

// DMA_BUF_IOCTL_SYNC = _IOW('b', 0, struct dma_buf_sync)
nix::ioctl_write_ptr!(dma_buf_ioctl_sync, b'b', 0, DmaBufSync);

/// A dma-buf mapped read-write into this process
pub struct DmaBuffer {
    fd: OwnedFd,
    ptr: NonNull<c_void>,
    len: usize,
    width: u16,
    height: u16,
    stride: usize,
}

impl DmaBuffer {
    /// Map `fd` for a `width` x `height` image with rows `stride` bytes apart.
    /// `size` is the buffer size the server reported; the mapping must fit in it.
    pub fn map(
        fd: OwnedFd,
        width: u16,
        height: u16,
        stride: usize,
        size: usize,
    ) -> ClientResult<Self> {
        let stride = stride.max(width as usize * BYTES_PER_PIXEL);
        let len = stride * height as usize;
        if len > size {
            return Err(ClientError::BufferTooSmall { needed: len, size });
        }
        let length = NonZeroUsize::new(len).ok_or(nix::Error::EINVAL)?;

        // SAFETY: fresh shared mapping of a descriptor we own; nothing else
        // in this process aliases it.
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )?
        };
        log::debug!("Mapped dma-buf fd {} ({} bytes, stride {})", fd.as_raw_fd(), len, stride);

        Ok(DmaBuffer {
            fd,
            ptr,
            len,
            width,
            height,
            stride,
        })
    }

    fn sync(&self, flags: u64) -> ClientResult<()> {
        let arg = DmaBufSync { flags };
        // SAFETY: arg outlives the call and matches the ioctl's layout
        unsafe { dma_buf_ioctl_sync(self.fd.as_raw_fd(), &arg) }?;
        Ok(())
    }
}

impl PixelBuffer for DmaBuffer {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, lives as long as self, and the
        // &mut self borrow makes this the only view of it.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }

    fn begin_access(&mut self) -> ClientResult<()> {
        self.sync(DMA_BUF_SYNC_START | DMA_BUF_SYNC_WRITE)
    }

    fn end_access(&mut self) -> ClientResult<()> {
        self.sync(DMA_BUF_SYNC_END | DMA_BUF_SYNC_WRITE)
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in map()
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            log::warn!("Failed to unmap dma-buf: {}", e);
        }
    }
}
