//! Tagged parameter buffers and info response buffers
//!
//! Parameter buffers (DPB, TPB, BPB) start with a version byte followed by
//! `tag [len value]` clumplets with one-byte lengths. Info responses are
//! `tag len(2, little-endian) value` items terminated by `isc_info_end`.

use bytes::Bytes;

use crate::buffer::ReadBuffer;
use crate::constants::info;
use crate::error::{Error, Result};

/// Builder for DPB, TPB and BPB style parameter buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBuffer {
    data: Vec<u8>,
}

impl ParameterBuffer {
    /// Start a buffer with its version byte
    pub fn new(version: u8) -> Self {
        Self { data: vec![version] }
    }

    /// Append a bare tag
    pub fn push_tag(&mut self, tag: u8) -> &mut Self {
        self.data.push(tag);
        self
    }

    /// Append a tag with a length-prefixed value
    pub fn push_bytes(&mut self, tag: u8, value: &[u8]) -> Result<&mut Self> {
        let len = u8::try_from(value.len()).map_err(|_| {
            Error::protocol(format!(
                "parameter {} value too long: {} bytes",
                tag,
                value.len()
            ))
        })?;
        self.data.push(tag);
        self.data.push(len);
        self.data.extend_from_slice(value);
        Ok(self)
    }

    /// Append a tag with a string value
    pub fn push_str(&mut self, tag: u8, value: &str) -> Result<&mut Self> {
        self.push_bytes(tag, value.as_bytes())
    }

    /// Append a tag with a 4-byte little-endian integer
    pub fn push_int(&mut self, tag: u8, value: i32) -> &mut Self {
        self.data.push(tag);
        self.data.push(4);
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a tag with a single byte value
    pub fn push_byte(&mut self, tag: u8, value: u8) -> &mut Self {
        self.data.push(tag);
        self.data.push(1);
        self.data.push(value);
        self
    }

    /// Raw buffer contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the raw buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Decode a little-endian integer of 1, 2, 4 or 8 bytes (sign-extended)
pub fn vax_integer(bytes: &[u8]) -> i64 {
    match bytes.len() {
        0 => 0,
        1 => bytes[0] as i8 as i64,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
        n => {
            let mut value: i64 = 0;
            for (shift, b) in bytes.iter().take(8).enumerate() {
                value |= (*b as i64) << (shift * 8);
            }
            if n < 8 && bytes[n - 1] & 0x80 != 0 {
                value |= -1i64 << (n * 8);
            }
            value
        }
    }
}

/// Append one `tag len value` item in info-response format
pub fn write_info_item(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
}

/// Sequential reader over an info response
#[derive(Debug)]
pub struct InfoReader {
    buf: ReadBuffer,
}

impl InfoReader {
    /// Create a reader over an info response
    pub fn new(data: Bytes) -> Self {
        Self {
            buf: ReadBuffer::new(data),
        }
    }

    /// Whether all bytes were consumed
    pub fn is_exhausted(&self) -> bool {
        self.buf.remaining() == 0
    }

    /// Read the next item tag
    pub fn next_tag(&mut self) -> Result<u8> {
        self.buf.read_u8()
    }

    /// Read a length-prefixed item value
    pub fn read_value(&mut self) -> Result<Bytes> {
        let len = self.buf.read_u16_le()? as usize;
        self.buf.read_bytes_owned(len)
    }

    /// Read a length-prefixed integer item value
    pub fn read_int(&mut self) -> Result<i64> {
        Ok(vax_integer(&self.read_value()?))
    }

    /// Read a length-prefixed string item value
    pub fn read_string(&mut self) -> Result<String> {
        let value = self.read_value()?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    /// Read every item up to `isc_info_end` into a flat list
    pub fn items(mut self) -> Result<InfoItems> {
        let mut items = Vec::new();
        loop {
            if self.is_exhausted() {
                // Some servers omit the terminator when the buffer is exactly full
                return Ok(InfoItems { items, truncated: false });
            }
            match self.next_tag()? {
                info::END => return Ok(InfoItems { items, truncated: false }),
                info::TRUNCATED => return Ok(InfoItems { items, truncated: true }),
                info::ERROR => {
                    return Err(Error::protocol("server reported an info request error"));
                }
                tag => {
                    let value = self.read_value()?;
                    items.push((tag, value));
                }
            }
        }
    }
}

/// Flat list of info items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoItems {
    /// Items in response order
    pub items: Vec<(u8, Bytes)>,
    /// Whether the server ran out of buffer space
    pub truncated: bool,
}

impl InfoItems {
    /// Value of the first item with this tag
    pub fn get(&self, tag: u8) -> Option<&Bytes> {
        self.items.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Integer value of the first item with this tag
    pub fn get_int(&self, tag: u8) -> Option<i64> {
        self.get(tag).map(|v| vax_integer(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{dpb, tpb};

    #[test]
    fn test_dpb_builder() {
        let mut pb = ParameterBuffer::new(dpb::VERSION1);
        pb.push_str(dpb::LC_CTYPE, "UTF8").unwrap();
        pb.push_int(dpb::SQL_DIALECT, 3);
        assert_eq!(
            pb.as_bytes(),
            &[1, 48, 4, b'U', b'T', b'F', b'8', 63, 4, 3, 0, 0, 0]
        );
    }

    #[test]
    fn test_tpb_tags() {
        let mut pb = ParameterBuffer::new(tpb::VERSION3);
        pb.push_tag(tpb::WRITE).push_tag(tpb::CONCURRENCY).push_tag(tpb::WAIT);
        assert_eq!(pb.into_bytes(), vec![3, 9, 2, 6]);
    }

    #[test]
    fn test_value_too_long() {
        let mut pb = ParameterBuffer::new(1);
        assert!(pb.push_bytes(1, &[0u8; 256]).is_err());
    }

    #[test]
    fn test_vax_integer() {
        assert_eq!(vax_integer(&[0x01, 0x02]), 0x0201);
        assert_eq!(vax_integer(&[0xFF]), -1);
        assert_eq!(vax_integer(&[0xFE, 0xFF, 0xFF, 0xFF]), -2);
        assert_eq!(vax_integer(&[1, 0, 0, 0, 0, 0, 0, 1]), 0x0100_0000_0000_0001);
        assert_eq!(vax_integer(&[0xFF, 0xFF, 0x7F]), 0x7F_FFFF);
    }

    #[test]
    fn test_info_items() {
        let mut raw = Vec::new();
        write_info_item(&mut raw, 4, &[3, 0, 0, 0]);
        write_info_item(&mut raw, 6, &[0x10, 0x27, 0, 0]);
        raw.push(info::END);
        let items = InfoReader::new(Bytes::from(raw)).items().unwrap();
        assert!(!items.truncated);
        assert_eq!(items.get_int(4), Some(3));
        assert_eq!(items.get_int(6), Some(10_000));
        assert_eq!(items.get_int(5), None);
    }

    #[test]
    fn test_info_truncated() {
        let mut raw = Vec::new();
        write_info_item(&mut raw, 4, &[1, 0]);
        raw.push(info::TRUNCATED);
        let items = InfoReader::new(Bytes::from(raw)).items().unwrap();
        assert!(items.truncated);
        assert_eq!(items.items.len(), 1);
    }

    #[test]
    fn test_info_short_value() {
        let raw = vec![4, 8, 0, 1, 2];
        assert!(InfoReader::new(Bytes::from(raw)).items().is_err());
    }
}
