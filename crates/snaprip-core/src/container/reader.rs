//! Bounds-checked cursor over an in-memory byte source.
//! Every offset handed to a walker comes from untrusted file bytes, so all
//! reads go through here and fail with `TruncatedData` instead of panicking.

use crate::error::{ParseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order from a TIFF-style marker (`II` / `MM`).
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match &marker {
            b"II" => Some(ByteOrder::Little),
            b"MM" => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Absolute seek. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(self.truncated(offset, 0));
        }
        self.pos = offset;
        Ok(())
    }

    /// Relative seek forward from the current position.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        let target = self
            .pos
            .checked_add(len)
            .ok_or_else(|| self.truncated(self.pos, len))?;
        self.seek(target)
    }

    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| self.truncated(offset, len))?;
        self.data
            .get(offset..end)
            .ok_or_else(|| self.truncated(offset, len))
    }

    pub fn array_at<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.bytes_at(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or_else(|| self.truncated(offset, 1))
    }

    pub fn u16_at(&self, offset: usize, order: ByteOrder) -> Result<u16> {
        let b = self.array_at::<2>(offset)?;
        Ok(match order {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        })
    }

    pub fn u32_at(&self, offset: usize, order: ByteOrder) -> Result<u32> {
        let b = self.array_at::<4>(offset)?;
        Ok(match order {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        })
    }

    pub fn u64_at(&self, offset: usize, order: ByteOrder) -> Result<u64> {
        let b = self.array_at::<8>(offset)?;
        Ok(match order {
            ByteOrder::Little => u64::from_le_bytes(b),
            ByteOrder::Big => u64::from_be_bytes(b),
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.u8_at(self.pos)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self, order: ByteOrder) -> Result<u16> {
        let v = self.u16_at(self.pos, order)?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self, order: ByteOrder) -> Result<u32> {
        let v = self.u32_at(self.pos, order)?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let v = self.bytes_at(self.pos, len)?;
        self.pos += len;
        Ok(v)
    }

    /// Sub-reader over `[offset, offset + len)`. Offsets inside the window are
    /// relative to its start, which is what TIFF blocks embedded in other
    /// containers expect.
    pub fn window(&self, offset: usize, len: usize) -> Result<ByteReader<'a>> {
        Ok(ByteReader::new(self.bytes_at(offset, len)?))
    }

    /// Sub-reader from `offset` to the end of the source.
    pub fn tail(&self, offset: usize) -> Result<ByteReader<'a>> {
        if offset > self.data.len() {
            return Err(self.truncated(offset, 0));
        }
        Ok(ByteReader::new(&self.data[offset..]))
    }

    fn truncated(&self, offset: usize, len: usize) -> ParseError {
        ParseError::TruncatedData {
            offset,
            len,
            available: self.data.len(),
        }
    }
}
