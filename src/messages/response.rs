//! Generic response and status vector
//!
//! Almost every request is answered by `op_response`:
//!
//! ```text
//! op_response   int
//! object        int     handle created by the request, or a status code
//! blob_id       quad
//! data          buffer  info items or other payload
//! status        vector  (arg, value)* isc_arg_end
//! ```

use bytes::Bytes;

use crate::buffer::ReadBuffer;
use crate::constants::{isc_arg, Operation};
use crate::error::{Error, Result, ServerError};

/// Decoded `op_response`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Handle or status code
    pub object: i32,
    /// Blob id, for blob creation
    pub blob_id: u64,
    /// Payload
    pub data: Bytes,
    /// Status vector; empty on plain success
    pub status: ServerError,
}

impl Response {
    /// Decode a full `op_response` message, skipping `op_dummy` keepalives
    pub fn decode(buf: &mut ReadBuffer) -> Result<Self> {
        match read_operation(buf)? {
            Operation::Response => Self::decode_body(buf),
            other => Err(Error::UnexpectedOperation(other as u32)),
        }
    }

    /// Decode the body after the operation code
    pub fn decode_body(buf: &mut ReadBuffer) -> Result<Self> {
        let object = buf.read_i32()?;
        let blob_id = buf.read_quad()?;
        let data = buf.read_buffer()?;
        let status = parse_status_vector(buf)?;
        Ok(Self {
            object,
            blob_id,
            data,
            status,
        })
    }

    /// Whether the server reported an error
    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Warnings carried by a successful response
    pub fn warning(&self) -> Option<&ServerError> {
        (!self.status.is_error() && !self.status.codes.is_empty()).then_some(&self.status)
    }

    /// Turn a server error into [`Error::Server`]
    pub fn into_result(self) -> Result<Self> {
        if self.is_error() {
            Err(Error::Server(self.status))
        } else {
            Ok(self)
        }
    }
}

/// Read the next operation code, skipping `op_dummy`
pub fn read_operation(buf: &mut ReadBuffer) -> Result<Operation> {
    loop {
        let op = Operation::try_from(buf.read_u32()?)?;
        if op != Operation::Dummy {
            return Ok(op);
        }
    }
}

/// Parse a status vector up to `isc_arg_end`
pub fn parse_status_vector(buf: &mut ReadBuffer) -> Result<ServerError> {
    let mut status = ServerError::default();
    loop {
        let arg = buf.read_u32()?;
        match arg {
            isc_arg::END => break,
            isc_arg::GDS => {
                let code = buf.read_u32()?;
                if code != 0 {
                    if status.gds_code == 0 {
                        status.gds_code = code;
                    }
                    status.codes.push(code);
                }
            }
            isc_arg::WARNING => {
                let code = buf.read_u32()?;
                if code != 0 {
                    status.codes.push(code);
                }
            }
            isc_arg::STRING | isc_arg::CSTRING | isc_arg::INTERPRETED => {
                status.arguments.push(buf.read_string()?);
            }
            isc_arg::SQL_STATE => {
                status.sql_state = Some(buf.read_string()?);
            }
            isc_arg::NUMBER => {
                status.arguments.push(buf.read_i32()?.to_string());
            }
            other => {
                return Err(Error::protocol(format!(
                    "unknown status vector argument {}",
                    other
                )))
            }
        }
    }
    Ok(status)
}
