//! Message channel over a transport
//!
//! Holds received-but-unconsumed bytes and the optional wire cipher. Messages
//! are decoded by retrying a pure decode function until it stops reporting
//! [`Error::BufferUnderflow`]; only then are the bytes consumed.

use bytes::BytesMut;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::crypto::{CryptPlugin, StreamCipher};
use crate::error::{Error, Result};

use super::Transport;

const READ_CHUNK: usize = 16 * 1024;

/// Framed, optionally encrypted message channel
pub struct WireChannel {
    transport: Box<dyn Transport>,
    cipher: Option<StreamCipher>,
    buffered: BytesMut,
}

impl std::fmt::Debug for WireChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireChannel")
            .field("cipher", &self.cipher_plugin())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl WireChannel {
    /// Wrap a connected transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            cipher: None,
            buffered: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Encrypt every byte from now on, in both directions
    ///
    /// Encryption cannot be switched off once enabled.
    pub fn enable_cipher(&mut self, cipher: StreamCipher) -> Result<()> {
        if self.cipher.is_some() {
            return Err(Error::WireCrypt("wire encryption already active".to_string()));
        }
        // Anything already buffered arrived in plain text
        self.cipher = Some(cipher);
        Ok(())
    }

    /// Active crypt plugin, if any
    pub fn cipher_plugin(&self) -> Option<CryptPlugin> {
        self.cipher.as_ref().map(StreamCipher::plugin)
    }

    /// Check if the underlying transport is connected
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send one encoded message
    pub async fn send(&mut self, buf: WriteBuffer) -> Result<()> {
        let mut data = buf.as_slice().to_vec();
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut data);
        }
        tracing::trace!(len = data.len(), "send");
        self.transport.send(&data).await
    }

    /// Receive one message using `decode`
    ///
    /// `decode` must not have side effects: it is rerun from the start of the
    /// message whenever more bytes are needed.
    pub async fn receive<T, F>(&mut self, mut decode: F) -> Result<T>
    where
        F: FnMut(&mut ReadBuffer) -> Result<T>,
    {
        loop {
            if !self.buffered.is_empty() {
                let mut buf = ReadBuffer::from_slice(&self.buffered);
                match decode(&mut buf) {
                    Ok(value) => {
                        let _ = self.buffered.split_to(buf.position());
                        return Ok(value);
                    }
                    Err(Error::BufferUnderflow { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let start = self.buffered.len();
        self.buffered.reserve(READ_CHUNK);
        let n = self.transport.receive(&mut self.buffered).await?;
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut self.buffered[start..]);
        }
        tracing::trace!(len = n, buffered = self.buffered.len(), "receive");
        Ok(())
    }

    /// Close the transport and discard buffered bytes
    pub async fn close(&mut self) -> Result<()> {
        self.buffered.clear();
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_receive_across_reads() {
        let (client, mut server) = tokio::io::duplex(8);
        let mut channel = WireChannel::new(Box::new(StreamTransport::new(client)));

        let writer = tokio::spawn(async move {
            let mut msg = WriteBuffer::new();
            msg.write_u32(9);
            msg.write_string("a message longer than the pipe");
            msg.write_u32(7);
            server.write_all(msg.as_slice()).await.unwrap();
            server
        });

        let (op, text) = channel
            .receive(|buf| Ok((buf.read_u32()?, buf.read_string()?)))
            .await
            .unwrap();
        assert_eq!(op, 9);
        assert_eq!(text, "a message longer than the pipe");

        // Remaining bytes stay buffered for the next message
        let next = channel.receive(|buf| buf.read_u32()).await.unwrap();
        assert_eq!(next, 7);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_error_is_returned() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel = WireChannel::new(Box::new(StreamTransport::new(client)));
        server.write_all(&[0, 0, 0, 1]).await.unwrap();
        let result: Result<()> = channel
            .receive(|buf| {
                buf.read_u32()?;
                Err(Error::protocol("bad"))
            })
            .await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_encrypted_both_directions() {
        let key = [3u8; 20];
        let (client, mut server) = tokio::io::duplex(256);
        let mut channel = WireChannel::new(Box::new(StreamTransport::new(client)));
        channel
            .enable_cipher(StreamCipher::new(CryptPlugin::Arc4, &key, None).unwrap())
            .unwrap();
        assert_eq!(channel.cipher_plugin(), Some(CryptPlugin::Arc4));
        assert!(channel
            .enable_cipher(StreamCipher::new(CryptPlugin::Arc4, &key, None).unwrap())
            .is_err());

        let mut peer = StreamCipher::new(CryptPlugin::Arc4, &key, None).unwrap();

        let mut out = WriteBuffer::new();
        out.write_u32(0x0102_0304);
        channel.send(out).await.unwrap();
        let mut wire = [0u8; 4];
        server.read_exact(&mut wire).await.unwrap();
        assert_ne!(wire, [1, 2, 3, 4]);
        peer.decrypt(&mut wire);
        assert_eq!(wire, [1, 2, 3, 4]);

        let mut reply = [0u8, 0, 0, 42];
        peer.encrypt(&mut reply);
        server.write_all(&reply).await.unwrap();
        assert_eq!(channel.receive(|b| b.read_u32()).await.unwrap(), 42);
    }
}
