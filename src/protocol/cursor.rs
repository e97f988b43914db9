//! Forward-only reader over replies and event records

use super::{ByteOrder, ClientError, ClientResult};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Reads fixed-width fields left to right from a borrowed buffer.
/// Running past the end is reported as [`ClientError::UnexpectedEof`].
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    byte_order: ByteOrder,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], byte_order: ByteOrder) -> Self {
        Cursor {
            data,
            pos: 0,
            byte_order,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> ClientResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> ClientResult<u16> {
        let bytes = self.take(2)?;
        Ok(match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::read_u16(bytes),
            ByteOrder::LSBFirst => LittleEndian::read_u16(bytes),
        })
    }

    pub fn read_i16(&mut self) -> ClientResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u24(&mut self) -> ClientResult<u32> {
        let bytes = self.take(3)?;
        Ok(match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::read_u24(bytes),
            ByteOrder::LSBFirst => LittleEndian::read_u24(bytes),
        })
    }

    pub fn read_u32(&mut self) -> ClientResult<u32> {
        let bytes = self.take(4)?;
        Ok(match self.byte_order {
            ByteOrder::MSBFirst => BigEndian::read_u32(bytes),
            ByteOrder::LSBFirst => LittleEndian::read_u32(bytes),
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> ClientResult<&'a [u8]> {
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> ClientResult<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> ClientResult<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ClientError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance() {
        let data = [1u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a];
        let mut cursor = Cursor::new(&data, ByteOrder::MSBFirst);

        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u24().unwrap(), 0x0004_0506);
        assert_eq!(cursor.position(), 6);
        assert_eq!(cursor.read_u32().unwrap(), 0x0708_090a);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_little_endian() {
        let data = [0x34u8, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut cursor = Cursor::new(&data, ByteOrder::LSBFirst);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_signed() {
        let data = [0xffu8, 0xfe];
        let mut cursor = Cursor::new(&data, ByteOrder::MSBFirst);
        assert_eq!(cursor.read_i16().unwrap(), -2);
    }

    #[test]
    fn test_skip_and_bytes() {
        let data = b"abcdefgh";
        let mut cursor = Cursor::new(data, ByteOrder::MSBFirst);
        cursor.skip(3).unwrap();
        assert_eq!(cursor.read_bytes(2).unwrap(), b"de");
        assert_eq!(cursor.remaining(), 3);
    }

    #[test]
    fn test_eof_is_checked() {
        let data = [1u8, 2, 3];
        let mut cursor = Cursor::new(&data, ByteOrder::MSBFirst);
        cursor.skip(2).unwrap();

        match cursor.read_u16() {
            Err(ClientError::UnexpectedEof {
                offset,
                needed,
                remaining,
            }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
        // A failed read does not move the position
        assert_eq!(cursor.position(), 2);
        assert!(cursor.skip(4).is_err());
        assert_eq!(cursor.read_u8().unwrap(), 3);
    }
}
