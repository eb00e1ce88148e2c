//! Transport layer
//!
//! The wire protocol is an unframed XDR byte stream. A [`Transport`] moves
//! raw bytes; [`WireChannel`] layers wire encryption and message decoding on
//! top of it.

mod channel;
mod stream;
mod tcp;

pub use channel::WireChannel;
pub use stream::StreamTransport;
pub use tcp::TcpTransport;

use bytes::BytesMut;

use crate::error::Result;

/// Trait for transport implementations
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send raw bytes to the server
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Append at least one received byte to `buf`
    ///
    /// Returns the number of bytes appended. A closed peer is reported as
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed).
    async fn receive(&mut self, buf: &mut BytesMut) -> Result<usize>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}
