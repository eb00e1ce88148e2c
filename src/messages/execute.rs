//! Statement requests: prepare, info, execute and free
//!
//! Execute layout (`op_execute` / `op_execute2`):
//! ```text
//! op               int
//! statement        int
//! transaction      int
//! input blr        buffer
//! message number   int
//! message count    int      0 or 1
//! [input row]
//! [output blr      buffer   op_execute2 only
//!  output message  int]
//! [timeout ms      int      protocol 16+]
//! [cursor flags    int      protocol 18+]
//! [inline blob max int      protocol 19+]
//! ```

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::codec::{RowCodec, RowDescriptor, RowValue};
use crate::constants::{protocol, Operation};
use crate::error::{Error, Result};

use super::fetch::InlineBlob;
use super::response::read_operation;

/// `op_prepare_statement`
#[derive(Debug)]
pub struct PrepareMessage<'a> {
    /// Transaction handle
    pub transaction: i32,
    /// Statement handle
    pub statement: i32,
    /// SQL dialect
    pub dialect: u32,
    /// Statement text
    pub sql: &'a str,
    /// Info items describing the statement
    pub items: &'a [u8],
    /// Size of the server's info buffer
    pub buffer_length: u32,
}

impl PrepareMessage<'_> {
    /// Encode the request
    pub fn build_request(&self) -> WriteBuffer {
        let mut buf = WriteBuffer::with_capacity(self.sql.len() + self.items.len() + 40);
        buf.write_u32(Operation::PrepareStatement as u32);
        buf.write_i32(self.transaction);
        buf.write_i32(self.statement);
        buf.write_u32(self.dialect);
        buf.write_string(self.sql);
        buf.write_buffer(self.items);
        buf.write_u32(self.buffer_length);
        buf
    }
}

/// `op_info_sql`: statement, incarnation, items, buffer length
pub fn info_sql_request(statement: i32, items: &[u8], buffer_length: u32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(items.len() + 20);
    buf.write_u32(Operation::InfoSql as u32);
    buf.write_i32(statement);
    buf.write_u32(0);
    buf.write_buffer(items);
    buf.write_u32(buffer_length);
    buf
}

/// `op_free_statement`: statement, option
pub fn free_statement_request(statement: i32, option: u32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(12);
    buf.write_u32(Operation::FreeStatement as u32);
    buf.write_i32(statement);
    buf.write_u32(option);
    buf
}

/// `op_set_cursor`: statement, NUL-terminated cursor name, cursor type
pub fn set_cursor_request(statement: i32, name: &str, cursor_type: u32) -> WriteBuffer {
    let mut name_bytes = Vec::with_capacity(name.len() + 1);
    name_bytes.extend_from_slice(name.as_bytes());
    name_bytes.push(0);

    let mut buf = WriteBuffer::with_capacity(name_bytes.len() + 20);
    buf.write_u32(Operation::SetCursor as u32);
    buf.write_i32(statement);
    buf.write_buffer(&name_bytes);
    buf.write_u32(cursor_type);
    buf
}

/// `op_execute` or `op_execute2`
#[derive(Debug)]
pub struct ExecuteMessage<'a> {
    /// Statement handle
    pub statement: i32,
    /// Transaction handle
    pub transaction: i32,
    /// Input message description
    pub input_blr: &'a [u8],
    /// Input descriptor and row, if the statement has parameters
    pub input: Option<(&'a RowDescriptor, &'a RowValue)>,
    /// Output message description; selects `op_execute2`
    pub output_blr: Option<&'a [u8]>,
    /// Statement timeout in milliseconds, 0 for none
    pub timeout_ms: u32,
    /// Cursor flags
    pub cursor_flags: u32,
    /// Largest inline blob accepted
    pub max_inline_blob_size: u32,
}

impl ExecuteMessage<'_> {
    /// Operation this message is sent as
    pub fn operation(&self) -> Operation {
        if self.output_blr.is_some() {
            Operation::Execute2
        } else {
            Operation::Execute
        }
    }

    /// Encode the request for `protocol_version`
    pub fn build_request(&self, protocol_version: u8) -> Result<WriteBuffer> {
        let mut buf = WriteBuffer::with_capacity(128);
        buf.write_u32(self.operation() as u32);
        buf.write_i32(self.statement);
        buf.write_i32(self.transaction);
        buf.write_buffer(self.input_blr);
        buf.write_u32(0);
        match self.input {
            Some((descriptor, row)) if !descriptor.is_empty() => {
                buf.write_u32(1);
                RowCodec::new(protocol_version).encode(descriptor, row, &mut buf)?;
            }
            _ => buf.write_u32(0),
        }
        if let Some(blr) = self.output_blr {
            buf.write_buffer(blr);
            buf.write_u32(0);
        }
        if protocol_version >= protocol::STMT_TIMEOUT_VERSION {
            buf.write_u32(self.timeout_ms);
        }
        if protocol_version >= protocol::FETCH_SCROLL_VERSION {
            buf.write_u32(self.cursor_flags);
        }
        if protocol_version >= protocol::INLINE_BLOB_VERSION {
            buf.write_u32(self.max_inline_blob_size);
        }
        Ok(buf)
    }
}

/// `op_sql_response` with any inline blobs sent ahead of it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlResponse {
    /// Singleton output row
    pub row: Option<RowValue>,
    /// Inline blobs referenced by the row
    pub inline_blobs: Vec<InlineBlob>,
}

impl SqlResponse {
    /// Decode the reply to `op_execute2` up to (not including) its `op_response`
    pub fn decode(buf: &mut ReadBuffer, descriptor: &RowDescriptor, codec: RowCodec) -> Result<Self> {
        let mut inline_blobs = Vec::new();
        loop {
            match read_operation(buf)? {
                Operation::InlineBlob => inline_blobs.push(InlineBlob::decode_body(buf)?),
                Operation::SqlResponse => {
                    let messages = buf.read_u32()?;
                    let row = if messages > 0 {
                        Some(codec.decode(descriptor, buf)?)
                    } else {
                        None
                    };
                    return Ok(Self { row, inline_blobs });
                }
                other => return Err(Error::UnexpectedOperation(other as u32)),
            }
        }
    }
}
