//! Request builder
//!
//! A [`Builder`] accumulates an outgoing byte string from fixed-width fields
//! and length-prefixed regions. Failures latch: once a write fails, every
//! later write is a no-op and the error surfaces from [`Builder::finish`].
//!
//! Length-prefixed regions are written through a closure that receives the
//! same builder narrowed to the region. The region is folded back (its length
//! backfilled) when the closure returns, so at most one region can be open at
//! a time and nothing can write to the enclosing region meanwhile.
//!
//! ```
//! use x11present::protocol::{Builder, ByteOrder};
//!
//! let mut b = Builder::new(ByteOrder::LSBFirst);
//! b.add_u8_length_prefixed(|child| {
//!     child.add_u8(42);
//!     child.add_u8_length_prefixed(|grandchild| {
//!         grandchild.add_u8(5);
//!     });
//! });
//! assert_eq!(b.finish().unwrap(), vec![3, 42, 1, 5]);
//! ```

use super::{pad, BuildError, ByteOrder};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Byte string builder with sticky errors
#[derive(Debug, Clone)]
pub struct Builder {
    buf: Vec<u8>,
    /// Hard limit for fixed builders; `None` grows as needed
    capacity: Option<usize>,
    byte_order: ByteOrder,
    /// Start of the innermost open region
    offset: usize,
    error: Option<BuildError>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new(ByteOrder::default())
    }
}

impl Builder {
    /// Create a builder that allocates space as needed
    pub fn new(byte_order: ByteOrder) -> Self {
        Builder {
            buf: Vec::new(),
            capacity: None,
            byte_order,
            offset: 0,
            error: None,
        }
    }

    /// Create a builder that never grows past `capacity` bytes.
    /// Writes that would exceed it latch [`BuildError::FixedCapacityExceeded`].
    pub fn with_fixed_capacity(capacity: usize, byte_order: ByteOrder) -> Self {
        Builder {
            buf: Vec::with_capacity(capacity),
            capacity: Some(capacity),
            byte_order,
            offset: 0,
            error: None,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Bytes written to the current region
    pub fn len(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The latched error, if any
    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    /// Latch an error. The first error wins; later writes are ignored.
    pub fn set_error(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Drop everything written so far, including a latched error
    pub fn clear(&mut self) {
        assert!(self.offset == 0, "clear called inside a length-prefixed region");
        self.buf.clear();
        self.error = None;
    }

    pub fn add_u8(&mut self, v: u8) -> &mut Self {
        self.add(&[v])
    }

    pub fn add_u16(&mut self, v: u16) -> &mut Self {
        let mut bytes = [0u8; 2];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u16(&mut bytes, v),
            ByteOrder::LSBFirst => LittleEndian::write_u16(&mut bytes, v),
        }
        self.add(&bytes)
    }

    pub fn add_i16(&mut self, v: i16) -> &mut Self {
        self.add_u16(v as u16)
    }

    /// Append a 24-bit value. The highest byte of `v` is silently dropped.
    pub fn add_u24(&mut self, v: u32) -> &mut Self {
        let mut bytes = [0u8; 3];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u24(&mut bytes, v & 0x00ff_ffff),
            ByteOrder::LSBFirst => LittleEndian::write_u24(&mut bytes, v & 0x00ff_ffff),
        }
        self.add(&bytes)
    }

    pub fn add_u32(&mut self, v: u32) -> &mut Self {
        let mut bytes = [0u8; 4];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u32(&mut bytes, v),
            ByteOrder::LSBFirst => LittleEndian::write_u32(&mut bytes, v),
        }
        self.add(&bytes)
    }

    pub fn add_u64(&mut self, v: u64) -> &mut Self {
        let mut bytes = [0u8; 8];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_u64(&mut bytes, v),
            ByteOrder::LSBFirst => LittleEndian::write_u64(&mut bytes, v),
        }
        self.add(&bytes)
    }

    /// Append a 16-bit count of the bytes or items that follow. A count
    /// too large for the field latches [`BuildError::PrefixOverflow`].
    pub fn add_u16_count(&mut self, n: usize) -> &mut Self {
        match u16::try_from(n) {
            Ok(n) => self.add_u16(n),
            Err(_) => {
                self.set_error(BuildError::PrefixOverflow { length: n, width: 2 });
                self
            }
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.add(bytes)
    }

    /// Append `n` zero bytes
    pub fn add_padding(&mut self, n: usize) -> &mut Self {
        if let Some(end) = self.reserve(n) {
            self.buf.resize(end, 0);
        }
        self
    }

    pub fn add_u8_length_prefixed<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_length_prefixed(1, f)
    }

    pub fn add_u16_length_prefixed<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_length_prefixed(2, f)
    }

    pub fn add_u24_length_prefixed<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_length_prefixed(3, f)
    }

    pub fn add_u32_length_prefixed<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        self.add_length_prefixed(4, f)
    }

    /// Reserve a `width`-byte length field, let `f` write the region body,
    /// then backfill the field with the number of bytes `f` wrote.
    ///
    /// A body too long for the field latches [`BuildError::PrefixOverflow`]
    /// and the whole region, prefix included, is discarded.
    pub fn add_length_prefixed<F>(&mut self, width: usize, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        assert!(
            (1..=4).contains(&width),
            "length prefix must be 1 to 4 bytes wide, got {}",
            width
        );
        if self.error.is_some() {
            return self;
        }

        let prefix_at = self.buf.len();
        self.add_padding(width);
        if self.error.is_some() {
            return self;
        }

        let body_at = prefix_at + width;
        let length = match self.region(body_at, f) {
            Some(length) => length,
            None => return self,
        };

        if (length as u64) >> (8 * width) != 0 {
            self.buf.truncate(prefix_at);
            self.set_error(BuildError::PrefixOverflow { length, width });
            return self;
        }

        self.write_uint_at(prefix_at, length as u64, width);
        self
    }

    /// Append one X11 request: opcode, data byte, and a 16-bit length in
    /// 4-byte units covering the whole request. The body written by `f` is
    /// padded to a 4-byte boundary before the length is backfilled.
    pub fn add_request<F>(&mut self, opcode: u8, data: u8, f: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        if self.error.is_some() {
            return self;
        }

        let start = self.buf.len();
        self.add_u8(opcode).add_u8(data).add_u16(0);
        if self.error.is_some() {
            return self;
        }

        let body = match self.region(start + 4, f) {
            Some(length) => length,
            None => return self,
        };
        self.add_padding(pad(body));
        if self.error.is_some() {
            return self;
        }

        let units = (self.buf.len() - start) / 4;
        if units > u16::MAX as usize {
            self.buf.truncate(start);
            self.set_error(BuildError::PrefixOverflow {
                length: units,
                width: 2,
            });
            return self;
        }

        self.write_uint_at(start + 2, units as u64, 2);
        self
    }

    /// Remove the last `n` bytes written to the current region.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds what the current region holds.
    pub fn rollback(&mut self, n: usize) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        assert!(
            n <= self.len(),
            "attempted to roll back {} bytes but the region holds {}",
            n,
            self.len()
        );
        let new_len = self.buf.len() - n;
        self.buf.truncate(new_len);
        self
    }

    /// Bytes of the current region, or the latched error
    pub fn bytes(&self) -> Result<&[u8], BuildError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(&self.buf[self.offset..]),
        }
    }

    /// Consume the builder and return its bytes, or the latched error
    pub fn finish(self) -> Result<Vec<u8>, BuildError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.buf),
        }
    }

    /// Like [`finish`](Self::finish) but panics on a latched error
    pub fn finish_or_panic(self) -> Vec<u8> {
        match self.finish() {
            Ok(bytes) => bytes,
            Err(err) => panic!("request builder failed: {}", err),
        }
    }

    /// Run `f` with the current region moved to `body_at`. Returns how many
    /// bytes the region holds afterwards, or `None` if `f` latched an error.
    fn region<F>(&mut self, body_at: usize, f: F) -> Option<usize>
    where
        F: FnOnce(&mut Builder),
    {
        let parent = std::mem::replace(&mut self.offset, body_at);
        f(self);
        let length = self.buf.len() - self.offset;
        self.offset = parent;

        if self.error.is_some() {
            None
        } else {
            Some(length)
        }
    }

    fn write_uint_at(&mut self, at: usize, value: u64, width: usize) {
        let field = &mut self.buf[at..at + width];
        match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::write_uint(field, value, width),
            ByteOrder::LSBFirst => LittleEndian::write_uint(field, value, width),
        }
    }

    fn add(&mut self, bytes: &[u8]) -> &mut Self {
        if self.reserve(bytes.len()).is_some() {
            self.buf.extend_from_slice(bytes);
        }
        self
    }

    /// Check that `extra` more bytes fit. Returns the new end of the buffer,
    /// or `None` with the error latched; nothing is written either way.
    fn reserve(&mut self, extra: usize) -> Option<usize> {
        if self.error.is_some() {
            return None;
        }
        match end_of(self.buf.len(), extra, self.capacity) {
            Ok(end) => Some(end),
            Err(err) => {
                self.set_error(err);
                None
            }
        }
    }
}

/// End offset after appending `extra` bytes to a buffer of `len` bytes
fn end_of(len: usize, extra: usize, capacity: Option<usize>) -> Result<usize, BuildError> {
    let end = len.checked_add(extra).ok_or(BuildError::SizeOverflow)?;
    match capacity {
        Some(capacity) if end > capacity => Err(BuildError::FixedCapacityExceeded {
            capacity,
            needed: end,
        }),
        _ => Ok(end),
    }
}
