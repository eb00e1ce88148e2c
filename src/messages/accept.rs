//! Server replies during the handshake
//!
//! ```text
//! op_accept        version, arch, type
//! op_accept_data   version, arch, type, data, plugin, authenticated, keys
//! op_cond_accept   (same as op_accept_data)
//! op_cont_auth     data, plugin, plugin list, keys
//! op_reject        -
//! op_response      see `Response`
//! ```

use bytes::Bytes;

use crate::buffer::ReadBuffer;
use crate::constants::{protocol, Operation};
use crate::error::{Error, Result};

use super::response::{read_operation, Response};

/// Protocol accepted by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptMessage {
    /// Negotiated protocol version (flag stripped)
    pub version: u8,
    /// Architecture
    pub architecture: u32,
    /// Accept type with flags
    pub accept_type: u32,
    /// Authentication data for the client
    pub data: Bytes,
    /// Plugin the server wants to use
    pub plugin: String,
    /// Whether authentication already completed
    pub authenticated: bool,
    /// Server key buffer
    pub keys: Bytes,
}

impl AcceptMessage {
    /// Whether the server accepted lazy send
    pub fn lazy_send(&self) -> bool {
        self.accept_type & protocol::PTYPE_MASK == protocol::PTYPE_LAZY_SEND
    }

    fn decode_version(buf: &mut ReadBuffer) -> Result<(u8, u32, u32)> {
        let raw = buf.read_u32()?;
        let version = if raw & protocol::FB_PROTOCOL_FLAG != 0 {
            raw & protocol::FB_PROTOCOL_MASK
        } else {
            raw
        };
        let version = u8::try_from(version).map_err(|_| Error::UnsupportedProtocolVersion(raw))?;
        Ok((version, buf.read_u32()?, buf.read_u32()?))
    }
}

/// Continued authentication round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContAuthMessage {
    /// Plugin data for the client
    pub data: Bytes,
    /// Plugin name
    pub plugin: String,
    /// Server plugin list
    pub plugin_list: String,
    /// Server key buffer
    pub keys: Bytes,
}

/// Any message the server may send during the handshake
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeReply {
    /// `op_accept`: no wire authentication
    Accept(AcceptMessage),
    /// `op_accept_data`
    AcceptData(AcceptMessage),
    /// `op_cond_accept`: authentication continues
    CondAccept(AcceptMessage),
    /// `op_cont_auth`
    ContAuth(ContAuthMessage),
    /// `op_reject`
    Reject,
    /// `op_response`
    Response(Response),
}

impl HandshakeReply {
    /// Decode one handshake message
    pub fn decode(buf: &mut ReadBuffer) -> Result<Self> {
        let op = read_operation(buf)?;
        match op {
            Operation::Accept => {
                let (version, architecture, accept_type) = AcceptMessage::decode_version(buf)?;
                Ok(HandshakeReply::Accept(AcceptMessage {
                    version,
                    architecture,
                    accept_type,
                    data: Bytes::new(),
                    plugin: String::new(),
                    authenticated: false,
                    keys: Bytes::new(),
                }))
            }
            Operation::AcceptData | Operation::CondAccept => {
                let (version, architecture, accept_type) = AcceptMessage::decode_version(buf)?;
                let msg = AcceptMessage {
                    version,
                    architecture,
                    accept_type,
                    data: buf.read_buffer()?,
                    plugin: buf.read_string()?,
                    authenticated: buf.read_u32()? != 0,
                    keys: buf.read_buffer()?,
                };
                Ok(if op == Operation::AcceptData {
                    HandshakeReply::AcceptData(msg)
                } else {
                    HandshakeReply::CondAccept(msg)
                })
            }
            Operation::ContAuth => Ok(HandshakeReply::ContAuth(ContAuthMessage {
                data: buf.read_buffer()?,
                plugin: buf.read_string()?,
                plugin_list: buf.read_string()?,
                keys: buf.read_buffer()?,
            })),
            Operation::Reject => Ok(HandshakeReply::Reject),
            Operation::Response => Ok(HandshakeReply::Response(Response::decode_body(buf)?)),
            other => Err(Error::UnexpectedOperation(other as u32)),
        }
    }
}
