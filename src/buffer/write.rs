//! Write buffer for encoding XDR protocol data
//!
//! Integers go out big-endian in 4-byte units; variable-length data is
//! length-prefixed and padded to a multiple of four.

use bytes::{BufMut, Bytes, BytesMut};

use super::padding;

const PAD: [u8; 4] = [0; 4];

/// A buffer for writing XDR-encoded protocol data
#[derive(Debug, Default)]
pub struct WriteBuffer {
    /// The underlying byte buffer
    data: BytesMut,
}

impl WriteBuffer {
    /// Create a new WriteBuffer with default capacity
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(512),
        }
    }

    /// Create a new WriteBuffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the current length of data in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Get the buffer contents as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the buffer into immutable Bytes
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    // =========================================================================
    // Raw byte writes
    // =========================================================================

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    /// Write a 16-bit unsigned integer in little-endian format
    pub fn write_u16_le(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write a 32-bit integer in little-endian format
    pub fn write_i32_le(&mut self, value: i32) {
        self.data.put_i32_le(value);
    }

    // =========================================================================
    // XDR writes
    // =========================================================================

    /// Write an XDR int
    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write an XDR unsigned int
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Write an XDR hyper
    pub fn write_i64(&mut self, value: i64) {
        self.data.put_i64(value);
    }

    /// Write an XDR quad
    pub fn write_quad(&mut self, value: u64) {
        self.data.put_u64(value);
    }

    /// Write fixed-length opaque data followed by padding
    pub fn write_opaque(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
        self.write_padding(bytes.len());
    }

    /// Write padding for data of length `len`
    pub fn write_padding(&mut self, len: usize) {
        self.data.put_slice(&PAD[..padding(len)]);
    }

    /// Write a length-prefixed buffer (`xdr_cstring`)
    pub fn write_buffer(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_opaque(bytes);
    }

    /// Write a length-prefixed string
    pub fn write_string(&mut self, s: &str) {
        self.write_buffer(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_i32() {
        let mut buf = WriteBuffer::new();
        buf.write_i32(-1);
        buf.write_u32(0x01020304);
        assert_eq!(buf.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 1, 2, 3, 4]);
    }

    #[test]
    fn test_write_buffer_pads() {
        let mut buf = WriteBuffer::new();
        buf.write_buffer(b"abcde");
        assert_eq!(buf.as_slice(), &[0, 0, 0, 5, b'a', b'b', b'c', b'd', b'e', 0, 0, 0]);
    }

    #[test]
    fn test_write_aligned_has_no_padding() {
        let mut buf = WriteBuffer::new();
        buf.write_string("Srp2");
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_write_empty_buffer() {
        let mut buf = WriteBuffer::new();
        buf.write_buffer(&[]);
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_little_endian() {
        let mut buf = WriteBuffer::new();
        buf.write_u16_le(0x0102);
        buf.write_i32_le(3);
        assert_eq!(buf.as_slice(), &[2, 1, 3, 0, 0, 0]);
    }
}
