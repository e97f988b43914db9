//! System-V shared memory segment (MIT-SHM path)

use super::{PixelBuffer, BYTES_PER_PIXEL};
use crate::protocol::ClientResult;
use nix::libc;
use std::ptr::{self, NonNull};

/// A private shared memory segment attached read-write
pub struct ShmSegment {
    shmid: i32,
    ptr: NonNull<u8>,
    len: usize,
    width: u16,
    height: u16,
}

impl ShmSegment {
    pub fn create(width: u16, height: u16) -> ClientResult<Self> {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        if len == 0 {
            return Err(nix::Error::EINVAL.into());
        }

        // SAFETY: plain syscall wrappers; results are checked below
        let shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600) };
        if shmid < 0 {
            return Err(nix::Error::last().into());
        }

        let addr = unsafe { libc::shmat(shmid, ptr::null(), 0) };
        if addr as isize == -1 {
            let err = nix::Error::last();
            unsafe { libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut()) };
            return Err(err.into());
        }
        let ptr = NonNull::new(addr as *mut u8).ok_or(nix::Error::EFAULT)?;

        log::debug!("Created shm segment {} ({} bytes)", shmid, len);
        Ok(ShmSegment {
            shmid,
            ptr,
            len,
            width,
            height,
        })
    }

    /// Kernel id the server attaches by
    pub fn shmid(&self) -> u32 {
        self.shmid as u32
    }
}

impl PixelBuffer for ShmSegment {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        // SAFETY: the segment is `len` bytes and stays attached while self lives
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe {
            if libc::shmdt(self.ptr.as_ptr() as *const libc::c_void) < 0 {
                log::warn!("Failed to detach shm segment {}: {}", self.shmid, nix::Error::last());
            }
            // Removal is deferred by the kernel until the server detaches too
            if libc::shmctl(self.shmid, libc::IPC_RMID, ptr::null_mut()) < 0 {
                log::warn!("Failed to remove shm segment {}: {}", self.shmid, nix::Error::last());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_write() {
        let mut seg = ShmSegment::create(8, 4).unwrap();
        assert_eq!(seg.pixels_mut().len(), 8 * 4 * 4);

        seg.with_cpu_access(&mut |pixels| pixels.fill(0x7f)).unwrap();
        assert!(seg.pixels_mut().iter().all(|&b| b == 0x7f));
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(ShmSegment::create(0, 10).is_err());
    }
}
