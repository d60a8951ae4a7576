//! Byte cursor over the local database stream
//!
//! The database format is a flat run of little-endian integers, raw byte
//! blocks and length-prefixed strings. The cursor reads exactly the bytes
//! it is asked for and tracks its absolute position; the scanner composes
//! it instead of inheriting from a general reader.

use std::io::{self, Read};

/// Sequential reader with explicit position tracking.
pub struct ByteCursor<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ByteCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Absolute offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        self.position += 1;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        self.position += 4;
        Ok(u32::from_le_bytes(buf))
    }

    /// Discard exactly `count` bytes.
    pub fn skip(&mut self, count: u64) -> io::Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(count), &mut io::sink())?;
        self.position += copied;
        if copied < count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record truncated while skipping {} bytes", count),
            ));
        }
        Ok(())
    }

    /// Decode a 7-bit variable-width unsigned integer (string length prefix).
    pub fn read_uleb128(&mut self) -> io::Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "variable-width length prefix too long",
                ));
            }
        }
    }

    /// Read a length-prefixed string.
    ///
    /// A zero presence byte means empty and consumes nothing further;
    /// otherwise a ULEB128 length is followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> io::Result<String> {
        if self.read_u8()? == 0 {
            return Ok(String::new());
        }
        let len = self.read_uleb128()?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        self.position += len;
        String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Advance past a length-prefixed string without materializing it.
    pub fn skip_string(&mut self) -> io::Result<()> {
        if self.read_u8()? == 0 {
            return Ok(());
        }
        let len = self.read_uleb128()?;
        self.skip(len)
    }
}
