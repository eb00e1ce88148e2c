//! BLR message descriptions
//!
//! Execute and fetch requests carry a BLR description of the message layout
//! so the server knows how to encode or decode row data:
//!
//! ```text
//! blr_version5 blr_begin blr_message 0 <count lo> <count hi>
//!     <type ...> blr_short 0      (per field: value, then null indicator)
//! blr_end blr_eoc
//! ```

use crate::codec::row::RowDescriptor;
use crate::constants::{blr, SqlType};
use crate::error::{Error, Result};

/// Build the BLR for a message described by `descriptor`
///
/// An empty descriptor yields an empty BLR, which the server reads as "no
/// message".
pub fn message_blr(descriptor: &RowDescriptor) -> Result<Vec<u8>> {
    if descriptor.is_empty() {
        return Ok(Vec::new());
    }
    let count = descriptor.len() * 2;
    if count > u16::MAX as usize {
        return Err(Error::protocol(format!("too many fields: {}", descriptor.len())));
    }

    let mut out = Vec::with_capacity(8 + descriptor.len() * 8);
    out.extend_from_slice(&[blr::VERSION5, blr::BEGIN, blr::MESSAGE, 0]);
    out.extend_from_slice(&(count as u16).to_le_bytes());

    for field in descriptor.fields() {
        let scale = field.scale as i8 as u8;
        match field.sql_type {
            SqlType::Varying => {
                out.push(blr::VARYING2);
                out.extend_from_slice(&field.charset_id.to_le_bytes());
                out.extend_from_slice(&length_u16(field.length)?.to_le_bytes());
            }
            SqlType::Text => {
                out.push(blr::TEXT2);
                out.extend_from_slice(&field.charset_id.to_le_bytes());
                out.extend_from_slice(&length_u16(field.length)?.to_le_bytes());
            }
            SqlType::Null => {
                out.push(blr::TEXT2);
                out.extend_from_slice(&[0, 0, 0, 0]);
            }
            SqlType::Double => out.push(blr::DOUBLE),
            SqlType::DFloat => out.push(blr::D_FLOAT),
            SqlType::Float => out.push(blr::FLOAT),
            SqlType::Date => out.push(blr::SQL_DATE),
            SqlType::Time => out.push(blr::SQL_TIME),
            SqlType::Timestamp => out.push(blr::TIMESTAMP),
            SqlType::Blob | SqlType::Array => out.extend_from_slice(&[blr::QUAD, 0]),
            SqlType::Quad => out.extend_from_slice(&[blr::QUAD, scale]),
            SqlType::Short => out.extend_from_slice(&[blr::SHORT, scale]),
            SqlType::Long => out.extend_from_slice(&[blr::LONG, scale]),
            SqlType::Int64 => out.extend_from_slice(&[blr::INT64, scale]),
            SqlType::Int128 => out.extend_from_slice(&[blr::INT128, scale]),
            SqlType::Boolean => out.push(blr::BOOL),
            SqlType::Dec16 => out.push(blr::DEC64),
            SqlType::Dec34 => out.push(blr::DEC128),
            SqlType::TimeTz => out.push(blr::SQL_TIME_TZ),
            SqlType::TimestampTz => out.push(blr::TIMESTAMP_TZ),
            SqlType::TimeTzEx => out.push(blr::EX_TIME_TZ),
            SqlType::TimestampTzEx => out.push(blr::EX_TIMESTAMP_TZ),
        }
        out.extend_from_slice(&[blr::SHORT, 0]);
    }

    out.extend_from_slice(&[blr::END, blr::EOC]);
    Ok(out)
}

fn length_u16(length: u32) -> Result<u16> {
    u16::try_from(length).map_err(|_| Error::protocol(format!("field length {} too large", length)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::row::FieldDescriptor;

    #[test]
    fn test_empty() {
        assert!(message_blr(&RowDescriptor::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_message_blr() {
        let desc = RowDescriptor::new(vec![
            FieldDescriptor::new(SqlType::Varying, 20).with_charset(4),
            FieldDescriptor::new(SqlType::Int64, 8).with_scale(-2),
            FieldDescriptor::new(SqlType::Blob, 8),
        ]);
        let blr = message_blr(&desc).unwrap();
        assert_eq!(
            blr,
            vec![
                5, 2, 4, 0, 6, 0, // header, 3 fields * 2
                38, 4, 0, 20, 0, 7, 0, // varying2 utf8 len 20, null ind
                16, 0xFE, 7, 0, // int64 scale -2
                9, 0, 7, 0, // quad for blob id
                255, 76,
            ]
        );
    }
}
