//! Read buffer for decoding XDR protocol data
//!
//! Every read checks the remaining length first; running off the end is
//! reported as [`Error::BufferUnderflow`] and never panics.

use bytes::Bytes;

use crate::error::{Error, Result};

use super::padding;

/// A buffer for reading XDR-encoded protocol data
#[derive(Debug, Clone)]
pub struct ReadBuffer {
    /// The underlying byte data
    data: Bytes,
    /// Current read position
    pos: usize,
}

impl ReadBuffer {
    /// Create a new ReadBuffer from bytes
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a new ReadBuffer from a byte slice
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            pos: 0,
        }
    }

    /// Get the current position in the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to be read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Get a slice of the remaining bytes (without advancing position)
    #[inline]
    pub fn remaining_bytes(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Skip `n` bytes in the buffer
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.pos += n;
        Ok(())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    #[inline]
    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::BufferUnderflow {
                needed: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure_remaining(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    // =========================================================================
    // Raw byte reads
    // =========================================================================

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.take::<1>()?;
        Ok(b)
    }

    /// Read raw bytes and return as a new Bytes (zero-copy)
    pub fn read_bytes_owned(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_remaining(n)?;
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Read raw bytes and return as a Vec
    pub fn read_bytes_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.read_bytes_owned(n)?.to_vec())
    }

    // =========================================================================
    // XDR reads (big-endian, 4-byte aligned)
    // =========================================================================

    /// Read an XDR int
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take::<4>()?))
    }

    /// Read an XDR unsigned int
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take::<4>()?))
    }

    /// Read an XDR hyper
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take::<8>()?))
    }

    /// Read an XDR quad (blob ids and the like)
    pub fn read_quad(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take::<8>()?))
    }

    /// Read fixed-length opaque data followed by its padding
    pub fn read_opaque(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_remaining(n + padding(n))?;
        let bytes = self.read_bytes_owned(n)?;
        self.pos += padding(n);
        Ok(bytes)
    }

    /// Read a length-prefixed buffer (`xdr_cstring`)
    pub fn read_buffer(&mut self) -> Result<Bytes> {
        let len = self.read_u32()? as usize;
        self.read_opaque(len)
    }

    /// Read a length-prefixed string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_buffer()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string: {}", e)))
    }

    // =========================================================================
    // Little-endian reads (info and parameter buffers)
    // =========================================================================

    /// Read a 16-bit unsigned integer in little-endian format
    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_i32() {
        let mut buf = ReadBuffer::from_slice(&[0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x09]);
        assert_eq!(buf.read_i32().unwrap(), -2);
        assert_eq!(buf.read_u32().unwrap(), 9);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_read_buffer_skips_padding() {
        let mut buf = ReadBuffer::from_slice(&[0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 0, 7]);
        assert_eq!(&buf.read_buffer().unwrap()[..], b"abc");
        assert_eq!(buf.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_read_string() {
        let mut buf = ReadBuffer::from_slice(&[0, 0, 0, 4, b'S', b'r', b'p', b'!']);
        assert_eq!(buf.read_string().unwrap(), "Srp!");
    }

    #[test]
    fn test_underflow_is_error() {
        let mut buf = ReadBuffer::from_slice(&[0, 0]);
        match buf.read_i32() {
            Err(Error::BufferUnderflow { needed: 4, available: 2 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
        // Position unchanged after a failed read
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn test_buffer_length_past_end() {
        let mut buf = ReadBuffer::from_slice(&[0, 0, 1, 0, 1, 2]);
        assert!(matches!(
            buf.read_buffer(),
            Err(Error::BufferUnderflow { .. })
        ));
    }

    #[test]
    fn test_missing_padding_is_underflow() {
        let mut buf = ReadBuffer::from_slice(&[0, 0, 0, 1, 9]);
        assert!(buf.read_buffer().is_err());
    }

    #[test]
    fn test_read_quad_and_le() {
        let mut buf = ReadBuffer::from_slice(&[0, 0, 0, 1, 0, 0, 0, 2, 0x34, 0x12]);
        assert_eq!(buf.read_quad().unwrap(), 0x0000_0001_0000_0002);
        assert_eq!(buf.read_u16_le().unwrap(), 0x1234);
    }
}
