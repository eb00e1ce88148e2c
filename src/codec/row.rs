//! Row values and their wire encoding
//!
//! A [`RowValue`] holds one byte buffer per field in the field's natural
//! big-endian width (SHORT is 2 bytes, TIMESTAMP is 8, and so on). On the
//! wire every component is widened to XDR units:
//!
//! - protocol 13+: a null bitmap (`ceil(n/8)` bytes, padded to 4), then the
//!   values of non-null fields only
//! - earlier protocols: every value followed by an int null indicator
//!
//! TEXT is fixed-length opaque data, VARYING a length-prefixed buffer.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::blob::BlobId;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{charset, protocol, SqlType};
use crate::error::{Error, Result};

/// Description of one input or output field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// SQL type with the nullability bit removed
    pub sql_type: SqlType,
    /// Whether the field accepts NULL
    pub nullable: bool,
    /// Subtype (blob subtype, or charset and collation for text)
    pub sub_type: i32,
    /// Decimal scale for exact numerics
    pub scale: i32,
    /// Declared length in bytes
    pub length: u32,
    /// Character set id for text types
    pub charset_id: u16,
    /// Underlying column name
    pub field_name: String,
    /// Table name
    pub relation_name: String,
    /// Owner of the table
    pub owner_name: String,
    /// Column alias
    pub alias: String,
}

impl FieldDescriptor {
    /// Create a nullable field with the given type and declared length
    pub fn new(sql_type: SqlType, length: u32) -> Self {
        Self {
            sql_type,
            nullable: true,
            sub_type: 0,
            scale: 0,
            length,
            charset_id: charset::NONE,
            field_name: String::new(),
            relation_name: String::new(),
            owner_name: String::new(),
            alias: String::new(),
        }
    }

    /// Set the scale
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    /// Set the subtype
    pub fn with_sub_type(mut self, sub_type: i32) -> Self {
        self.sub_type = sub_type;
        self
    }

    /// Set the character set
    pub fn with_charset(mut self, charset_id: u16) -> Self {
        self.charset_id = charset_id;
        self
    }

    /// Set the column alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Mark the field NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Type code as sent in BLR and SQLDA (nullability bit set when nullable)
    pub fn type_code(&self) -> u32 {
        self.sql_type.code() as u32 | self.nullable as u32
    }

    /// In-memory width of fixed-size types, `None` for TEXT and VARYING
    pub fn fixed_width(&self) -> Option<usize> {
        components(self.sql_type).map(|c| c.iter().map(Component::width).sum())
    }
}

/// Immutable, shared list of field descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescriptor {
    fields: Arc<[FieldDescriptor]>,
}

impl RowDescriptor {
    /// Create a descriptor from its fields
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    /// Descriptor with no fields
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field at `index`
    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }
}

/// One row of field buffers; `None` is NULL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowValue {
    fields: Vec<Option<Bytes>>,
}

impl RowValue {
    /// Empty row to be filled with `push_*`
    pub fn new() -> Self {
        Self::default()
    }

    /// Row from field buffers
    pub fn from_fields(fields: Vec<Option<Bytes>>) -> Self {
        Self { fields }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw buffer of field `index`, `None` if NULL or out of range
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.fields.get(index).and_then(|f| f.as_ref())
    }

    /// Whether field `index` is NULL
    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    /// Replace field `index`
    pub fn set(&mut self, index: usize, value: Option<Bytes>) -> Result<()> {
        let slot = self
            .fields
            .get_mut(index)
            .ok_or_else(|| Error::invalid_state(format!("field index {} out of range", index)))?;
        *slot = value;
        Ok(())
    }

    /// All field buffers
    pub fn fields(&self) -> &[Option<Bytes>] {
        &self.fields
    }

    /// Consume into field buffers
    pub fn into_fields(self) -> Vec<Option<Bytes>> {
        self.fields
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Append a NULL field
    pub fn push_null(mut self) -> Self {
        self.fields.push(None);
        self
    }

    /// Append raw bytes (TEXT, VARYING, or pre-encoded values)
    pub fn push_bytes(mut self, value: impl Into<Bytes>) -> Self {
        self.fields.push(Some(value.into()));
        self
    }

    /// Append a string
    pub fn push_str(self, value: &str) -> Self {
        self.push_bytes(Bytes::copy_from_slice(value.as_bytes()))
    }

    /// Append a SHORT
    pub fn push_i16(self, value: i16) -> Self {
        self.push_bytes(value.to_be_bytes().to_vec())
    }

    /// Append a LONG
    pub fn push_i32(self, value: i32) -> Self {
        self.push_bytes(value.to_be_bytes().to_vec())
    }

    /// Append an INT64
    pub fn push_i64(self, value: i64) -> Self {
        self.push_bytes(value.to_be_bytes().to_vec())
    }

    /// Append a DOUBLE
    pub fn push_f64(self, value: f64) -> Self {
        self.push_bytes(value.to_be_bytes().to_vec())
    }

    /// Append a BOOLEAN
    pub fn push_bool(self, value: bool) -> Self {
        self.push_bytes(vec![value as u8])
    }

    /// Append a blob id
    pub fn push_blob_id(self, id: BlobId) -> Self {
        self.push_bytes(id.0.to_be_bytes().to_vec())
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    fn fixed<const N: usize>(&self, index: usize) -> Result<Option<[u8; N]>> {
        match self.get(index) {
            None => Ok(None),
            Some(b) => b.as_ref().try_into().map(Some).map_err(|_| Error::FieldEncoding {
                index,
                message: format!("expected {} bytes, found {}", N, b.len()),
            }),
        }
    }

    /// Field as SHORT
    pub fn get_i16(&self, index: usize) -> Result<Option<i16>> {
        Ok(self.fixed::<2>(index)?.map(i16::from_be_bytes))
    }

    /// Field as LONG
    pub fn get_i32(&self, index: usize) -> Result<Option<i32>> {
        Ok(self.fixed::<4>(index)?.map(i32::from_be_bytes))
    }

    /// Field as INT64
    pub fn get_i64(&self, index: usize) -> Result<Option<i64>> {
        Ok(self.fixed::<8>(index)?.map(i64::from_be_bytes))
    }

    /// Field as DOUBLE
    pub fn get_f64(&self, index: usize) -> Result<Option<f64>> {
        Ok(self.fixed::<8>(index)?.map(f64::from_be_bytes))
    }

    /// Field as BOOLEAN
    pub fn get_bool(&self, index: usize) -> Result<Option<bool>> {
        Ok(self.fixed::<1>(index)?.map(|[b]| b != 0))
    }

    /// Field as blob id
    pub fn get_blob_id(&self, index: usize) -> Result<Option<BlobId>> {
        Ok(self.fixed::<8>(index)?.map(|b| BlobId(u64::from_be_bytes(b))))
    }

    /// Field as UTF-8 text
    pub fn get_str(&self, index: usize) -> Result<Option<&str>> {
        match self.get(index) {
            None => Ok(None),
            Some(b) => std::str::from_utf8(b).map(Some).map_err(|e| Error::FieldEncoding {
                index,
                message: e.to_string(),
            }),
        }
    }
}

// =============================================================================
// Wire layout
// =============================================================================

/// One XDR unit of a fixed-size value
#[derive(Debug, Clone, Copy)]
enum Component {
    /// `n` raw bytes padded to four
    Raw(usize),
    /// 2-byte signed value widened to an int
    Short,
    /// 2-byte unsigned value widened to an int
    UShort,
}

impl Component {
    fn width(&self) -> usize {
        match self {
            Component::Raw(n) => *n,
            Component::Short | Component::UShort => 2,
        }
    }
}

fn components(sql_type: SqlType) -> Option<&'static [Component]> {
    use Component::*;
    Some(match sql_type {
        SqlType::Text | SqlType::Varying => return None,
        SqlType::Short => &[Short],
        SqlType::Long | SqlType::Float | SqlType::Date | SqlType::Time => &[Raw(4)],
        SqlType::Int64
        | SqlType::Double
        | SqlType::DFloat
        | SqlType::Timestamp
        | SqlType::Blob
        | SqlType::Array
        | SqlType::Quad
        | SqlType::Dec16 => &[Raw(8)],
        SqlType::Int128 | SqlType::Dec34 => &[Raw(16)],
        SqlType::Boolean => &[Raw(1)],
        SqlType::TimeTz => &[Raw(4), UShort],
        SqlType::TimeTzEx => &[Raw(4), UShort, Short],
        SqlType::TimestampTz => &[Raw(8), UShort],
        SqlType::TimestampTzEx => &[Raw(8), UShort, Short],
        SqlType::Null => &[],
    })
}

/// Row encoder/decoder for one negotiated protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCodec {
    protocol_version: u8,
}

impl RowCodec {
    /// Codec for the given protocol version
    pub fn new(protocol_version: u8) -> Self {
        Self { protocol_version }
    }

    fn uses_null_bitmap(&self) -> bool {
        self.protocol_version >= protocol::NULL_BITMAP_VERSION
    }

    /// Encode `row` as described by `descriptor`
    pub fn encode(&self, descriptor: &RowDescriptor, row: &RowValue, buf: &mut WriteBuffer) -> Result<()> {
        if row.len() != descriptor.len() {
            return Err(Error::FieldEncoding {
                index: row.len().min(descriptor.len()),
                message: format!(
                    "row has {} fields, descriptor has {}",
                    row.len(),
                    descriptor.len()
                ),
            });
        }

        if self.uses_null_bitmap() {
            let mut bitmap = vec![0u8; descriptor.len().div_ceil(8)];
            for (i, value) in row.fields().iter().enumerate() {
                if value.is_none() {
                    bitmap[i / 8] |= 1 << (i % 8);
                }
            }
            buf.write_opaque(&bitmap);
            for (i, (field, value)) in descriptor.fields().iter().zip(row.fields()).enumerate() {
                if let Some(value) = value {
                    encode_value(i, field, value, buf)?;
                }
            }
        } else {
            for (i, (field, value)) in descriptor.fields().iter().zip(row.fields()).enumerate() {
                match value {
                    Some(value) => {
                        encode_value(i, field, value, buf)?;
                        buf.write_i32(0);
                    }
                    None => {
                        encode_placeholder(field, buf);
                        buf.write_i32(-1);
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode one row described by `descriptor`
    pub fn decode(&self, descriptor: &RowDescriptor, buf: &mut ReadBuffer) -> Result<RowValue> {
        let mut fields = Vec::with_capacity(descriptor.len());
        if self.uses_null_bitmap() {
            let bitmap = buf.read_opaque(descriptor.len().div_ceil(8))?;
            for (i, field) in descriptor.fields().iter().enumerate() {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    fields.push(None);
                } else {
                    fields.push(Some(decode_value(field, buf)?));
                }
            }
        } else {
            for field in descriptor.fields() {
                let value = decode_value(field, buf)?;
                let indicator = buf.read_i32()?;
                fields.push(if indicator == 0 { Some(value) } else { None });
            }
        }
        Ok(RowValue::from_fields(fields))
    }
}

fn encode_value(index: usize, field: &FieldDescriptor, value: &[u8], buf: &mut WriteBuffer) -> Result<()> {
    let declared = field.length as usize;
    match components(field.sql_type) {
        None if field.sql_type == SqlType::Text => {
            if value.len() > declared {
                return Err(Error::FieldEncoding {
                    index,
                    message: format!("{} bytes exceed declared length {}", value.len(), declared),
                });
            }
            let pad = if field.charset_id == charset::OCTETS { 0 } else { b' ' };
            buf.write_bytes(value);
            for _ in value.len()..declared {
                buf.write_u8(pad);
            }
            buf.write_padding(declared);
        }
        None => {
            if value.len() > declared {
                return Err(Error::FieldEncoding {
                    index,
                    message: format!("{} bytes exceed declared length {}", value.len(), declared),
                });
            }
            buf.write_buffer(value);
        }
        Some(parts) => {
            let width: usize = parts.iter().map(Component::width).sum();
            if value.len() != width {
                return Err(Error::FieldEncoding {
                    index,
                    message: format!("{:?} needs {} bytes, got {}", field.sql_type, width, value.len()),
                });
            }
            let mut offset = 0;
            for part in parts {
                let chunk = &value[offset..offset + part.width()];
                match part {
                    Component::Raw(_) => buf.write_opaque(chunk),
                    Component::Short => buf.write_i32(i16::from_be_bytes([chunk[0], chunk[1]]) as i32),
                    Component::UShort => buf.write_u32(u16::from_be_bytes([chunk[0], chunk[1]]) as u32),
                }
                offset += part.width();
            }
        }
    }
    Ok(())
}

fn encode_placeholder(field: &FieldDescriptor, buf: &mut WriteBuffer) {
    match components(field.sql_type) {
        None if field.sql_type == SqlType::Text => {
            let declared = field.length as usize;
            for _ in 0..declared {
                buf.write_u8(0);
            }
            buf.write_padding(declared);
        }
        None => buf.write_buffer(&[]),
        Some(parts) => {
            for part in parts {
                match part {
                    Component::Raw(n) => buf.write_opaque(&vec![0u8; *n]),
                    Component::Short | Component::UShort => buf.write_i32(0),
                }
            }
        }
    }
}

fn decode_value(field: &FieldDescriptor, buf: &mut ReadBuffer) -> Result<Bytes> {
    let declared = field.length as usize;
    match components(field.sql_type) {
        None if field.sql_type == SqlType::Text => buf.read_opaque(declared),
        None => {
            let len = buf.read_u32()? as usize;
            if len > declared {
                return Err(Error::protocol(format!(
                    "VARYING length {} exceeds declared length {}",
                    len, declared
                )));
            }
            buf.read_opaque(len)
        }
        Some([Component::Raw(n)]) => buf.read_opaque(*n),
        Some(parts) => {
            let mut out = BytesMut::with_capacity(16);
            for part in parts {
                match part {
                    Component::Raw(n) => out.put_slice(&buf.read_opaque(*n)?),
                    Component::Short => out.put_i16(buf.read_i32()? as i16),
                    Component::UShort => out.put_u16(buf.read_u32()? as u16),
                }
            }
            Ok(out.freeze())
        }
    }
}

// =============================================================================
// Blob segments
// =============================================================================

/// Prefix each chunk of `data` with its 2-byte little-endian length
pub fn encode_segments(data: &[u8], max_segment: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2 * (data.len() / max_segment.max(1) + 1));
    for chunk in data.chunks(max_segment.max(1)) {
        out.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

/// Split length-prefixed segments
pub fn split_segments(data: &Bytes) -> Result<Vec<Bytes>> {
    let mut buf = ReadBuffer::new(data.clone());
    let mut segments = Vec::new();
    while buf.remaining() > 0 {
        let len = buf.read_u16_le()? as usize;
        segments.push(buf.read_bytes_owned(len)?);
    }
    Ok(segments)
}

/// Concatenate length-prefixed segments, dropping their headers
pub fn strip_segment_headers(data: &Bytes) -> Result<Bytes> {
    let segments = split_segments(data)?;
    if segments.len() == 1 {
        return Ok(segments.into_iter().next().unwrap_or_default());
    }
    let mut out = BytesMut::with_capacity(data.len());
    for segment in segments {
        out.put_slice(&segment);
    }
    Ok(out.freeze())
}
