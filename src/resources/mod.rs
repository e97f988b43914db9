//! Resource ids and resource tracking
//!
//! The server hands every connection a base/mask pair during setup; the
//! client builds its own resource ids from that range with
//! [`ResourceIdAllocator`]. [`ResourceTracker`] remembers what the session
//! created so it can be released again on shutdown.

use crate::protocol::*;
use std::collections::HashSet;

/// Client-side resource id allocation over the range granted at setup
#[derive(Debug, Clone)]
pub struct ResourceIdAllocator {
    base: u32,
    mask: u32,
    counter: u32,
}

impl ResourceIdAllocator {
    pub fn new(base: u32, mask: u32) -> Self {
        ResourceIdAllocator {
            base,
            mask,
            counter: 0,
        }
    }

    /// Next id: `(counter & mask) | base`. Ids repeat once more than
    /// `mask + 1` have been handed out.
    pub fn allocate(&mut self) -> u32 {
        let id = (self.counter & self.mask) | self.base;
        self.counter = self.counter.wrapping_add(1);
        id
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u32 {
        self.counter
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }
}

/// Tracks all resources the session has created on the server
#[derive(Debug, Default)]
pub struct ResourceTracker {
    windows: HashSet<Window>,
    pixmaps: HashSet<Pixmap>,
    gcs: HashSet<GContext>,
    /// Attached shm segments with the MIT-SHM major opcode used to attach them
    shm_segments: HashSet<(u8, ShmSeg)>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_window(&mut self, window: Window) {
        self.windows.insert(window);
    }

    pub fn track_pixmap(&mut self, pixmap: Pixmap) {
        self.pixmaps.insert(pixmap);
    }

    pub fn track_gc(&mut self, gc: GContext) {
        self.gcs.insert(gc);
    }

    pub fn track_shm_segment(&mut self, major_opcode: u8, shmseg: ShmSeg) {
        self.shm_segments.insert((major_opcode, shmseg));
    }

    /// Forget a window the server destroyed on its own
    pub fn forget_window(&mut self, window: Window) {
        self.windows.remove(&window);
    }

    pub fn owns_window(&self, window: Window) -> bool {
        self.windows.contains(&window)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
            && self.pixmaps.is_empty()
            && self.gcs.is_empty()
            && self.shm_segments.is_empty()
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            windows: self.windows.len(),
            pixmaps: self.pixmaps.len(),
            gcs: self.gcs.len(),
            shm_segments: self.shm_segments.len(),
        }
    }

    /// Cleanup requests for everything still tracked, dependents first:
    /// segments, then GCs and pixmaps, windows last. The tracker is empty
    /// afterwards.
    pub fn drain_cleanup(&mut self) -> Vec<CleanupRequest> {
        let mut cleanup = Vec::new();

        for (major_opcode, shmseg) in self.shm_segments.drain() {
            cleanup.push(CleanupRequest::ShmDetach { major_opcode, shmseg });
        }
        for gc in self.gcs.drain() {
            cleanup.push(CleanupRequest::FreeGC(gc));
        }
        for pixmap in self.pixmaps.drain() {
            cleanup.push(CleanupRequest::FreePixmap(pixmap));
        }
        for window in self.windows.drain() {
            cleanup.push(CleanupRequest::DestroyWindow(window));
        }

        cleanup
    }
}

/// Resource counts per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCounts {
    pub windows: usize,
    pub pixmaps: usize,
    pub gcs: usize,
    pub shm_segments: usize,
}

/// Request releasing one tracked resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupRequest {
    DestroyWindow(Window),
    FreePixmap(Pixmap),
    FreeGC(GContext),
    ShmDetach { major_opcode: u8, shmseg: ShmSeg },
}

impl CleanupRequest {
    pub fn encode(&self, b: &mut Builder) {
        match *self {
            CleanupRequest::DestroyWindow(window) => DestroyWindowRequest { window }.encode(b),
            CleanupRequest::FreePixmap(pixmap) => FreePixmapRequest { pixmap }.encode(b),
            CleanupRequest::FreeGC(gc) => FreeGCRequest { gc }.encode(b),
            CleanupRequest::ShmDetach {
                major_opcode,
                shmseg,
            } => ShmDetachRequest {
                major_opcode,
                shmseg,
            }
            .encode(b),
        }
    }
}
