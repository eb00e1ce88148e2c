//! Wire encoding of buffers and rows

use firebird_rs::buffer::{ReadBuffer, WriteBuffer};
use firebird_rs::codec::blr::message_blr;
use firebird_rs::codec::row::{split_segments, strip_segment_headers};
use firebird_rs::codec::{FieldDescriptor, RowCodec, RowDescriptor, RowValue};
use firebird_rs::constants::SqlType;
use firebird_rs::Error;

#[test]
fn test_buffers_are_padded_to_four_bytes() {
    let mut buf = WriteBuffer::new();
    buf.write_buffer(b"abc");
    buf.write_string("Srp256");
    assert_eq!(
        buf.as_slice(),
        &[0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 0, 6, b'S', b'r', b'p', b'2', b'5', b'6', 0, 0]
    );

    let mut read = ReadBuffer::from_slice(buf.as_slice());
    assert_eq!(&read.read_buffer().unwrap()[..], b"abc");
    assert_eq!(read.read_string().unwrap(), "Srp256");
    assert_eq!(read.remaining(), 0);
}

#[test]
fn test_short_read_is_underflow() {
    let mut read = ReadBuffer::from_slice(&[0, 0, 0, 9, 1, 2]);
    assert!(matches!(read.read_buffer(), Err(Error::BufferUnderflow { .. })));
}

fn two_longs() -> RowDescriptor {
    RowDescriptor::new(vec![
        FieldDescriptor::new(SqlType::Long, 4),
        FieldDescriptor::new(SqlType::Long, 4),
    ])
}

#[test]
fn test_null_bitmap_rows() {
    let desc = two_longs();
    let row = RowValue::new().push_i32(7).push_null();
    let codec = RowCodec::new(13);

    let mut buf = WriteBuffer::new();
    codec.encode(&desc, &row, &mut buf).unwrap();
    assert_eq!(buf.as_slice(), &[0b10, 0, 0, 0, 0, 0, 0, 7]);

    let decoded = codec
        .decode(&desc, &mut ReadBuffer::from_slice(buf.as_slice()))
        .unwrap();
    assert_eq!(decoded, row);
    assert!(decoded.is_null(1));
}

#[test]
fn test_indicator_rows_before_protocol_13() {
    let desc = two_longs();
    let row = RowValue::new().push_i32(7).push_null();
    let codec = RowCodec::new(12);

    let mut buf = WriteBuffer::new();
    codec.encode(&desc, &row, &mut buf).unwrap();
    assert_eq!(
        buf.as_slice(),
        &[0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]
    );
    let decoded = codec
        .decode(&desc, &mut ReadBuffer::from_slice(buf.as_slice()))
        .unwrap();
    assert_eq!(decoded, row);
}

#[test]
fn test_short_is_widened_on_the_wire() {
    let desc = RowDescriptor::new(vec![FieldDescriptor::new(SqlType::Short, 2)]);
    let row = RowValue::new().push_i16(-2);
    let mut buf = WriteBuffer::new();
    RowCodec::new(13).encode(&desc, &row, &mut buf).unwrap();
    assert_eq!(buf.as_slice(), &[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFE]);
}

#[test]
fn test_text_is_space_padded() {
    let desc = RowDescriptor::new(vec![FieldDescriptor::new(SqlType::Text, 5).with_charset(4)]);
    let mut buf = WriteBuffer::new();
    RowCodec::new(13)
        .encode(&desc, &RowValue::new().push_str("ab"), &mut buf)
        .unwrap();
    assert_eq!(buf.as_slice(), &[0, 0, 0, 0, b'a', b'b', b' ', b' ', b' ', 0, 0, 0]);

    let too_long = RowValue::new().push_str("abcdef");
    let err = RowCodec::new(13)
        .encode(&desc, &too_long, &mut WriteBuffer::new())
        .unwrap_err();
    assert!(matches!(err, Error::FieldEncoding { index: 0, .. }));
}

#[test]
fn test_field_count_mismatch() {
    let err = RowCodec::new(13)
        .encode(&two_longs(), &RowValue::new().push_i32(1), &mut WriteBuffer::new())
        .unwrap_err();
    assert!(matches!(err, Error::FieldEncoding { .. }));
}

#[test]
fn test_message_blr() {
    assert!(message_blr(&RowDescriptor::empty()).unwrap().is_empty());

    let blr = message_blr(&two_longs()).unwrap();
    // version5 begin message 0, 4 items (value + null flag per field)
    assert_eq!(&blr[..6], &[5, 2, 4, 0, 4, 0]);
    assert_eq!(blr.last(), Some(&76));
}

#[test]
fn test_segments() {
    let data = bytes::Bytes::from_static(&[3, 0, b'a', b'b', b'c', 1, 0, b'd']);
    let segments = split_segments(&data).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(&strip_segment_headers(&data).unwrap()[..], b"abcd");

    let short = bytes::Bytes::from_static(&[5, 0, b'a']);
    assert!(strip_segment_headers(&short).is_err());
}
