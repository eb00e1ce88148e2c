//! Authentication math and wire encryption
//!
//! - [`srp`]: SRP-6a client for the `Srp*` plugins
//! - [`legacy`]: DES-crypt hash for `Legacy_Auth`
//! - [`cipher`]: Arc4 / ChaCha / ChaCha64 stream ciphers
//!
//! Crypt plugins form a closed set; [`CryptPlugin::ALL`] is the registry.

pub mod cipher;
pub mod legacy;
pub mod srp;

use std::collections::HashMap;
use std::fmt;

use crate::constants::key_tag;
use crate::error::{Error, Result};

pub use cipher::StreamCipher;

/// Wire encryption plugins known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptPlugin {
    /// ChaCha20 with a 64-bit nonce
    ChaCha64,
    /// ChaCha20 with a 96-bit nonce
    ChaCha,
    /// RC4
    Arc4,
}

impl CryptPlugin {
    /// Every supported plugin in default preference order
    pub const ALL: [CryptPlugin; 3] = [CryptPlugin::ChaCha64, CryptPlugin::ChaCha, CryptPlugin::Arc4];

    /// Name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            CryptPlugin::ChaCha64 => "ChaCha64",
            CryptPlugin::ChaCha => "ChaCha",
            CryptPlugin::Arc4 => "Arc4",
        }
    }

    /// Look up a plugin by its wire name
    pub fn from_name(name: &str) -> Option<CryptPlugin> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether the plugin needs plugin-specific data (an IV) from the server
    pub fn requires_iv(&self) -> bool {
        !matches!(self, CryptPlugin::Arc4)
    }
}

impl fmt::Display for CryptPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One key type advertised by the server and the plugins able to use it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerKey {
    /// Key type, `Symmetric` for wire crypt
    pub key_type: String,
    /// Plugin names in server preference order
    pub plugins: Vec<String>,
}

/// Parsed server key buffer (`p_acpt_keys` or the keys of `op_cont_auth`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerKeys {
    /// Advertised keys
    pub keys: Vec<ServerKey>,
    /// Plugin-specific data by plugin name
    pub specific_data: HashMap<String, Vec<u8>>,
}

impl ServerKeys {
    /// Parse `tag len value` clumplets
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut result = ServerKeys::default();
        let mut pos = 0;
        while pos < data.len() {
            if pos + 2 > data.len() {
                return Err(Error::protocol("truncated server key buffer"));
            }
            let tag = data[pos];
            let len = data[pos + 1] as usize;
            let value = data
                .get(pos + 2..pos + 2 + len)
                .ok_or_else(|| Error::protocol("truncated server key buffer"))?;
            pos += 2 + len;

            match tag {
                key_tag::KEY_TYPE => result.keys.push(ServerKey {
                    key_type: String::from_utf8_lossy(value).into_owned(),
                    plugins: Vec::new(),
                }),
                key_tag::KEY_PLUGINS => {
                    let plugins = String::from_utf8_lossy(value)
                        .split_whitespace()
                        .map(str::to_string)
                        .collect();
                    match result.keys.last_mut() {
                        Some(key) => key.plugins = plugins,
                        None => result.keys.push(ServerKey {
                            key_type: key_tag::SYMMETRIC.to_string(),
                            plugins,
                        }),
                    }
                }
                key_tag::PLUGIN_SPECIFIC => {
                    let split = value.iter().position(|b| *b == 0).unwrap_or(value.len());
                    let name = String::from_utf8_lossy(&value[..split]).into_owned();
                    let specific = value.get(split + 1..).unwrap_or_default().to_vec();
                    result.specific_data.insert(name, specific);
                }
                _ => {}
            }
        }
        Ok(result)
    }

    /// Merge keys from a later message
    pub fn merge(&mut self, other: ServerKeys) {
        self.keys.extend(other.keys);
        self.specific_data.extend(other.specific_data);
    }

    /// Whether no keys were advertised
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// First server-listed symmetric plugin also in `allowed`
    pub fn select(&self, allowed: &[CryptPlugin]) -> Option<CryptPlugin> {
        self.keys
            .iter()
            .filter(|k| k.key_type == key_tag::SYMMETRIC)
            .flat_map(|k| k.plugins.iter())
            .filter_map(|name| CryptPlugin::from_name(name))
            .find(|p| allowed.contains(p))
    }
}
