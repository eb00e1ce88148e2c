//! Fetch requests and their row stream
//!
//! A fetch is answered by a sequence of `op_fetch_response` messages, one per
//! row, closed by one carrying a zero count:
//!
//! ```text
//! op_fetch_response  int
//! status             int   0 = ok, 100 = end of cursor
//! count              int   1 = a row follows, 0 = batch complete
//! [row]
//! ```
//!
//! From protocol 19 `op_inline_blob` messages may be interleaved with rows.

use bytes::Bytes;

use crate::blob::BlobId;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::codec::{RowCodec, RowDescriptor, RowValue};
use crate::constants::{fetch_status, Operation, ScrollOp};
use crate::error::{Error, Result, ServerError};

use super::response::{read_operation, Response};

/// `op_fetch` or `op_fetch_scroll`
#[derive(Debug)]
pub struct FetchMessage<'a> {
    /// Statement handle
    pub statement: i32,
    /// Output message description
    pub blr: &'a [u8],
    /// Rows requested
    pub count: u32,
    /// Scroll operation and position; selects `op_fetch_scroll`
    pub scroll: Option<(ScrollOp, i32)>,
}

impl<'a> FetchMessage<'a> {
    /// Forward fetch of `count` rows
    pub fn new(statement: i32, blr: &'a [u8], count: u32) -> Self {
        Self {
            statement,
            blr,
            count,
            scroll: None,
        }
    }

    /// Scrollable fetch
    pub fn scroll(statement: i32, blr: &'a [u8], count: u32, op: ScrollOp, position: i32) -> Self {
        Self {
            statement,
            blr,
            count,
            scroll: Some((op, position)),
        }
    }

    /// Encode the request
    pub fn build_request(&self) -> WriteBuffer {
        let mut buf = WriteBuffer::with_capacity(self.blr.len() + 32);
        let op = if self.scroll.is_some() {
            Operation::FetchScroll
        } else {
            Operation::Fetch
        };
        buf.write_u32(op as u32);
        buf.write_i32(self.statement);
        buf.write_buffer(self.blr);
        buf.write_u32(0);
        buf.write_u32(self.count);
        if let Some((op, position)) = self.scroll {
            buf.write_u32(op as u32);
            buf.write_i32(position);
        }
        buf
    }
}

/// Blob pushed inline by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBlob {
    /// Transaction the blob belongs to
    pub transaction: i32,
    /// Blob id
    pub blob_id: BlobId,
    /// Blob info items
    pub info: Bytes,
    /// Segmented payload (2-byte length headers included)
    pub data: Bytes,
}

impl InlineBlob {
    /// Decode the body after `op_inline_blob`
    pub fn decode_body(buf: &mut ReadBuffer) -> Result<Self> {
        Ok(Self {
            transaction: buf.read_i32()?,
            blob_id: BlobId(buf.read_quad()?),
            info: buf.read_buffer()?,
            data: buf.read_buffer()?,
        })
    }
}

/// One message of a fetch reply
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPart {
    /// A row
    Row(RowValue),
    /// A blob pushed inline ahead of the row referencing it
    InlineBlob(InlineBlob),
    /// The batch is complete
    End {
        /// Whether the server reported end of cursor
        end_of_cursor: bool,
    },
    /// Server error in place of further rows
    Error(ServerError),
}

impl FetchPart {
    /// Decode exactly one message of a fetch reply
    pub fn decode(buf: &mut ReadBuffer, descriptor: &RowDescriptor, codec: RowCodec) -> Result<Self> {
        match read_operation(buf)? {
            Operation::FetchResponse => {
                let status = buf.read_u32()?;
                let count = buf.read_u32()?;
                if count == 0 || status == fetch_status::NO_MORE_ROWS {
                    return Ok(FetchPart::End {
                        end_of_cursor: status == fetch_status::NO_MORE_ROWS,
                    });
                }
                if status != fetch_status::OK {
                    return Err(Error::protocol(format!("unexpected fetch status {}", status)));
                }
                Ok(FetchPart::Row(codec.decode(descriptor, buf)?))
            }
            Operation::InlineBlob => Ok(FetchPart::InlineBlob(InlineBlob::decode_body(buf)?)),
            Operation::Response => {
                let response = Response::decode_body(buf)?;
                if response.is_error() {
                    Ok(FetchPart::Error(response.status))
                } else {
                    Ok(FetchPart::End { end_of_cursor: false })
                }
            }
            other => Err(Error::UnexpectedOperation(other as u32)),
        }
    }
}

/// Rows and side data of one completed fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    /// Rows in cursor order
    pub rows: Vec<RowValue>,
    /// Inline blobs received with the rows
    pub inline_blobs: Vec<InlineBlob>,
    /// Whether the server reported end of cursor
    pub end_of_cursor: bool,
    /// Server error ending the fetch
    pub error: Option<ServerError>,
}

impl FetchBatch {
    /// Add one decoded message; true once the batch is complete
    pub fn push(&mut self, part: FetchPart) -> bool {
        match part {
            FetchPart::Row(row) => self.rows.push(row),
            FetchPart::InlineBlob(blob) => self.inline_blobs.push(blob),
            FetchPart::End { end_of_cursor } => {
                self.end_of_cursor = end_of_cursor;
                return true;
            }
            FetchPart::Error(status) => {
                self.error = Some(status);
                return true;
            }
        }
        false
    }

    /// Decode a complete fetch reply held in `buf`
    ///
    /// A server error ends the batch and is returned in [`FetchBatch::error`]
    /// so the reply is consumed in full.
    pub fn decode(buf: &mut ReadBuffer, descriptor: &RowDescriptor, codec: RowCodec) -> Result<Self> {
        let mut batch = FetchBatch::default();
        while !batch.push(FetchPart::decode(buf, descriptor, codec)?) {}
        Ok(batch)
    }

    /// Surface a server error, keeping nothing else
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(status) => Err(Error::Server(status)),
            None => Ok(self),
        }
    }
}
