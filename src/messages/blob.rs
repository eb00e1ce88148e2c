//! Blob requests
//!
//! Open and create return the blob handle in `object` of the response;
//! create also returns the new blob id. `op_get_segment` answers with a
//! status in `object` (0 complete, 1 partial segment, 2 end of blob) and
//! the segments in `data`.

use crate::blob::BlobId;
use crate::buffer::WriteBuffer;
use crate::codec::row::encode_segments;
use crate::constants::{Operation, MAX_SEGMENT_SIZE};

/// `op_open_blob2`: bpb, transaction, blob id
pub fn open_blob_request(bpb: &[u8], transaction: i32, blob_id: BlobId) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(24 + bpb.len());
    buf.write_u32(Operation::OpenBlob2 as u32);
    buf.write_buffer(bpb);
    buf.write_i32(transaction);
    buf.write_quad(blob_id.0);
    buf
}

/// `op_create_blob2`: bpb, transaction, zero blob id
pub fn create_blob_request(bpb: &[u8], transaction: i32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(24 + bpb.len());
    buf.write_u32(Operation::CreateBlob2 as u32);
    buf.write_buffer(bpb);
    buf.write_i32(transaction);
    buf.write_quad(0);
    buf
}

/// `op_get_segment`: handle, requested length, empty segment buffer
pub fn get_segment_request(handle: i32, length: u32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(16);
    buf.write_u32(Operation::GetSegment as u32);
    buf.write_i32(handle);
    buf.write_u32(length);
    buf.write_buffer(&[]);
    buf
}

/// `op_batch_segments`: handle, total length, segments with 2-byte headers
///
/// `data` is split into segments of at most [`MAX_SEGMENT_SIZE`] bytes.
pub fn put_segments_request(handle: i32, data: &[u8]) -> WriteBuffer {
    let segments = encode_segments(data, MAX_SEGMENT_SIZE);
    let mut buf = WriteBuffer::with_capacity(segments.len() + 16);
    buf.write_u32(Operation::BatchSegments as u32);
    buf.write_i32(handle);
    buf.write_u32(segments.len() as u32);
    buf.write_buffer(&segments);
    buf
}

/// `op_info_blob`: handle, incarnation, items, buffer length
pub fn info_blob_request(handle: i32, items: &[u8], buffer_length: u32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(items.len() + 20);
    buf.write_u32(Operation::InfoBlob as u32);
    buf.write_i32(handle);
    buf.write_u32(0);
    buf.write_buffer(items);
    buf.write_u32(buffer_length);
    buf
}
