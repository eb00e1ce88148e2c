//! Handshake requests: `op_connect`, `op_cont_auth` and `op_crypt`
//!
//! `op_connect` layout:
//! ```text
//! op_connect         int
//! op_attach          int     operation the connection is for
//! CONNECT_VERSION3   int
//! arch_generic       int
//! database path      string
//! protocol count     int
//! user id            buffer  CNCT clumplets (tag, len, data)
//! count x { version, arch, min ptype, max ptype, weight }
//! ```

use crate::auth::{plugin_list, AuthPlugin};
use crate::buffer::WriteBuffer;
use crate::config::WireCrypt;
use crate::constants::{cnct, protocol, Operation};
use crate::error::{Error, Result};

/// Connect request opening the handshake
#[derive(Debug, Clone)]
pub struct ConnectMessage {
    /// Database path or alias
    pub database: String,
    /// Protocol versions offered, most preferred first
    pub versions: Vec<u8>,
    /// Normalized login
    pub login: String,
    /// Plugin whose initial data is attached
    pub plugin: AuthPlugin,
    /// All allowed plugins
    pub plugins: Vec<AuthPlugin>,
    /// Initial data of `plugin`
    pub specific_data: Vec<u8>,
    /// Requested wire crypt level
    pub wire_crypt: WireCrypt,
    /// OS user of the client process
    pub os_user: String,
    /// Client host name
    pub host: String,
}

impl ConnectMessage {
    /// Encode the request
    pub fn build_request(&self) -> Result<WriteBuffer> {
        let mut buf = WriteBuffer::with_capacity(256);
        buf.write_u32(Operation::Connect as u32);
        buf.write_u32(Operation::Attach as u32);
        buf.write_u32(protocol::CONNECT_VERSION3);
        buf.write_u32(protocol::ARCH_GENERIC);
        buf.write_string(&self.database);
        buf.write_u32(self.versions.len() as u32);
        buf.write_buffer(&self.user_identification()?);

        let count = self.versions.len() as u32;
        for (i, version) in self.versions.iter().enumerate() {
            buf.write_u32(protocol::FB_PROTOCOL_FLAG | u32::from(*version));
            buf.write_u32(protocol::ARCH_GENERIC);
            buf.write_u32(protocol::PTYPE_RPC);
            buf.write_u32(protocol::PTYPE_LAZY_SEND);
            // Higher weight wins
            buf.write_u32((count - i as u32) * 2);
        }
        Ok(buf)
    }

    /// CNCT user identification clumplets
    pub fn user_identification(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(128);
        clumplet(&mut out, cnct::LOGIN, self.login.as_bytes())?;
        clumplet(&mut out, cnct::PLUGIN_NAME, self.plugin.name().as_bytes())?;
        clumplet(&mut out, cnct::PLUGIN_LIST, plugin_list(&self.plugins).as_bytes())?;
        for (index, chunk) in self
            .specific_data
            .chunks(cnct::SPECIFIC_DATA_CHUNK)
            .enumerate()
        {
            let mut data = Vec::with_capacity(chunk.len() + 1);
            data.push(index as u8);
            data.extend_from_slice(chunk);
            clumplet(&mut out, cnct::SPECIFIC_DATA, &data)?;
        }
        clumplet(
            &mut out,
            cnct::CLIENT_CRYPT,
            &self.wire_crypt.wire_value().to_le_bytes(),
        )?;
        clumplet(&mut out, cnct::USER, self.os_user.as_bytes())?;
        clumplet(&mut out, cnct::HOST, self.host.as_bytes())?;
        clumplet(&mut out, cnct::USER_VERIFICATION, &[])?;
        Ok(out)
    }
}

fn clumplet(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len())
        .map_err(|_| Error::protocol(format!("CNCT item {} too long: {} bytes", tag, value.len())))?;
    out.push(tag);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}

/// `op_cont_auth`: data, plugin name, plugin list, keys
pub fn cont_auth_request(data: &[u8], plugin: AuthPlugin, plugins: &[AuthPlugin]) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(data.len() + 64);
    buf.write_u32(Operation::ContAuth as u32);
    buf.write_buffer(data);
    buf.write_string(plugin.name());
    buf.write_string(&plugin_list(plugins));
    buf.write_buffer(&[]);
    buf
}

/// `op_crypt`: plugin name, key type
pub fn crypt_request(plugin: &str, key_type: &str) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(32);
    buf.write_u32(Operation::Crypt as u32);
    buf.write_string(plugin);
    buf.write_string(key_type);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReadBuffer;

    fn message(specific_len: usize) -> ConnectMessage {
        ConnectMessage {
            database: "employee".to_string(),
            versions: vec![19, 13],
            login: "SYSDBA".to_string(),
            plugin: AuthPlugin::Srp256,
            plugins: vec![AuthPlugin::Srp256, AuthPlugin::Srp],
            specific_data: vec![b'a'; specific_len],
            wire_crypt: WireCrypt::Enabled,
            os_user: "app".to_string(),
            host: "client".to_string(),
        }
    }

    #[test]
    fn test_connect_layout() {
        let bytes = message(4).build_request().unwrap().freeze();
        let mut buf = ReadBuffer::new(bytes);
        assert_eq!(buf.read_u32().unwrap(), Operation::Connect as u32);
        assert_eq!(buf.read_u32().unwrap(), Operation::Attach as u32);
        assert_eq!(buf.read_u32().unwrap(), protocol::CONNECT_VERSION3);
        assert_eq!(buf.read_u32().unwrap(), protocol::ARCH_GENERIC);
        assert_eq!(buf.read_string().unwrap(), "employee");
        assert_eq!(buf.read_u32().unwrap(), 2);
        let uid = buf.read_buffer().unwrap();
        assert_eq!(&uid[..2], &[cnct::LOGIN, 6]);

        assert_eq!(buf.read_u32().unwrap(), protocol::FB_PROTOCOL_FLAG | 19);
        buf.skip(12).unwrap();
        let first_weight = buf.read_u32().unwrap();
        assert_eq!(buf.read_u32().unwrap(), protocol::FB_PROTOCOL_FLAG | 13);
        buf.skip(12).unwrap();
        assert!(first_weight > buf.read_u32().unwrap());
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_specific_data_chunking() {
        let uid = message(300).user_identification().unwrap();
        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < uid.len() {
            let (tag, len) = (uid[pos], uid[pos + 1] as usize);
            if tag == cnct::SPECIFIC_DATA {
                chunks.push((uid[pos + 2], len - 1));
            }
            pos += 2 + len;
        }
        assert_eq!(chunks, vec![(0, 254), (1, 46)]);
    }

    #[test]
    fn test_cont_auth() {
        let bytes = cont_auth_request(b"proof", AuthPlugin::Srp, &[AuthPlugin::Srp]).freeze();
        let mut buf = ReadBuffer::new(bytes);
        assert_eq!(buf.read_u32().unwrap(), Operation::ContAuth as u32);
        assert_eq!(&buf.read_buffer().unwrap()[..], b"proof");
        assert_eq!(buf.read_string().unwrap(), "Srp");
        assert_eq!(buf.read_string().unwrap(), "Srp");
        assert!(buf.read_buffer().unwrap().is_empty());
    }
}
