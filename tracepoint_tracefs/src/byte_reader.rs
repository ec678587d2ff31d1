// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Bounds-checked reader for raw trace data that may be in big-endian or
/// little-endian byte order.
///
/// Unlike a plain slice conversion, every read takes an offset and returns
/// `None` instead of panicking when the value would extend past the end of
/// the source. Raw buffer contents are untrusted, so callers turn `None`
/// into a per-page parse error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TraceByteReader {
    source_big_endian: bool,
}

impl TraceByteReader {
    /// true if running on a big-endian system.
    pub const HOST_IS_BIG_ENDIAN: bool = cfg!(target_endian = "big");

    /// A reader for data in the byte order of the host system. Raw ftrace
    /// buffers read on the local machine always use this.
    pub const KEEP_ENDIAN: Self = Self::new(Self::HOST_IS_BIG_ENDIAN);

    /// Create a new reader that will interpret input data bytes as indicated by the
    /// source_big_endian parameter.
    pub const fn new(source_big_endian: bool) -> Self {
        return Self { source_big_endian };
    }

    /// Returns true if the input data bytes are being interpreted as big-endian.
    pub const fn source_big_endian(self) -> bool {
        return self.source_big_endian;
    }

    /// Reads a u8 at `offset`.
    pub fn read_u8(self, source: &[u8], offset: usize) -> Option<u8> {
        return source.get(offset).copied();
    }

    /// Reads an i8 at `offset`.
    pub fn read_i8(self, source: &[u8], offset: usize) -> Option<i8> {
        return self.read_u8(source, offset).map(|v| v as i8);
    }

    /// Reads a u16 at `offset`.
    pub fn read_u16(self, source: &[u8], offset: usize) -> Option<u16> {
        let bytes = Self::array::<2>(source, offset)?;
        return Some(if self.source_big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        });
    }

    /// Reads an i16 at `offset`.
    pub fn read_i16(self, source: &[u8], offset: usize) -> Option<i16> {
        return self.read_u16(source, offset).map(|v| v as i16);
    }

    /// Reads a u32 at `offset`.
    pub fn read_u32(self, source: &[u8], offset: usize) -> Option<u32> {
        let bytes = Self::array::<4>(source, offset)?;
        return Some(if self.source_big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        });
    }

    /// Reads an i32 at `offset`.
    pub fn read_i32(self, source: &[u8], offset: usize) -> Option<i32> {
        return self.read_u32(source, offset).map(|v| v as i32);
    }

    /// Reads a u64 at `offset`.
    pub fn read_u64(self, source: &[u8], offset: usize) -> Option<u64> {
        let bytes = Self::array::<8>(source, offset)?;
        return Some(if self.source_big_endian {
            u64::from_be_bytes(bytes)
        } else {
            u64::from_le_bytes(bytes)
        });
    }

    /// Reads an i64 at `offset`.
    pub fn read_i64(self, source: &[u8], offset: usize) -> Option<i64> {
        return self.read_u64(source, offset).map(|v| v as i64);
    }

    /// Reads an unsigned integer of `size` bytes (1, 2, 4 or 8) at `offset`,
    /// zero-extended to u64. Returns `None` for any other size.
    pub fn read_unsigned(self, source: &[u8], offset: usize, size: usize) -> Option<u64> {
        return match size {
            1 => self.read_u8(source, offset).map(u64::from),
            2 => self.read_u16(source, offset).map(u64::from),
            4 => self.read_u32(source, offset).map(u64::from),
            8 => self.read_u64(source, offset),
            _ => None,
        };
    }

    /// Reads a signed integer of `size` bytes (1, 2, 4 or 8) at `offset`,
    /// sign-extended to i64. Returns `None` for any other size.
    pub fn read_signed(self, source: &[u8], offset: usize, size: usize) -> Option<i64> {
        return match size {
            1 => self.read_i8(source, offset).map(i64::from),
            2 => self.read_i16(source, offset).map(i64::from),
            4 => self.read_i32(source, offset).map(i64::from),
            8 => self.read_i64(source, offset),
            _ => None,
        };
    }

    fn array<const N: usize>(source: &[u8], offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        return source.get(offset..end)?.try_into().ok();
    }
}

impl Default for TraceByteReader {
    fn default() -> Self {
        Self::KEEP_ENDIAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_U16: u16 = 0x1234;
    const TEST_U32: u32 = 0x12345678;
    const TEST_U64: u64 = 0x1234567890abcdef;

    #[test]
    fn read_both_orders() {
        let le = TraceByteReader::new(false);
        let be = TraceByteReader::new(true);

        assert_eq!(Some(TEST_U16), le.read_u16(&TEST_U16.to_le_bytes(), 0));
        assert_eq!(Some(TEST_U16), be.read_u16(&TEST_U16.to_be_bytes(), 0));
        assert_eq!(Some(TEST_U32), le.read_u32(&TEST_U32.to_le_bytes(), 0));
        assert_eq!(Some(TEST_U32), be.read_u32(&TEST_U32.to_be_bytes(), 0));
        assert_eq!(Some(TEST_U64), le.read_u64(&TEST_U64.to_le_bytes(), 0));
        assert_eq!(Some(TEST_U64), be.read_u64(&TEST_U64.to_be_bytes(), 0));
    }

    #[test]
    fn out_of_bounds() {
        let reader = TraceByteReader::new(false);
        let bytes = [1u8, 2, 3];

        assert_eq!(None, reader.read_u32(&bytes, 0));
        assert_eq!(None, reader.read_u16(&bytes, 2));
        assert_eq!(None, reader.read_u8(&bytes, 3));
        assert_eq!(None, reader.read_u64(&bytes, usize::MAX));
        assert_eq!(Some(0x0302), reader.read_u16(&bytes, 1));
    }

    #[test]
    fn sized_reads() {
        let reader = TraceByteReader::new(false);
        let bytes = (-2i32).to_le_bytes();

        assert_eq!(Some(-2), reader.read_signed(&bytes, 0, 4));
        assert_eq!(Some(0xFFFF_FFFE), reader.read_unsigned(&bytes, 0, 4));
        assert_eq!(Some(-2), reader.read_signed(&bytes, 0, 1));
        assert_eq!(None, reader.read_unsigned(&bytes, 0, 3));
    }
}
