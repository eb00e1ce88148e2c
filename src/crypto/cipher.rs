//! Symmetric wire ciphers
//!
//! Once `op_crypt` is acknowledged every byte in both directions passes
//! through a stream cipher. Each direction keeps its own keystream.
//!
//! | Plugin   | Key                | IV                                  |
//! |----------|--------------------|-------------------------------------|
//! | Arc4     | session key        | none                                |
//! | ChaCha   | SHA-256(session)   | 12-byte nonce, or 4-byte counter + 12-byte nonce |
//! | ChaCha64 | SHA-256(session)   | 8-byte nonce, or 8-byte counter + 8-byte nonce   |

use chacha20::cipher::{KeyIvInit, StreamCipher as _, StreamCipherSeek};
use chacha20::{ChaCha20, ChaCha20Legacy};
use rc4::consts::U20;
use rc4::{KeyInit, Rc4};
use sha2::{Digest, Sha256};

use super::CryptPlugin;
use crate::error::{Error, Result};

/// One direction of an active wire cipher
enum Keystream {
    Arc4(Box<Rc4<U20>>),
    ChaCha(Box<ChaCha20>),
    ChaCha64(Box<ChaCha20Legacy>),
}

impl Keystream {
    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Keystream::Arc4(c) => rc4::StreamCipher::apply_keystream(c.as_mut(), data),
            Keystream::ChaCha(c) => c.apply_keystream(data),
            Keystream::ChaCha64(c) => c.apply_keystream(data),
        }
    }
}

/// Paired encrypt/decrypt keystreams for one session
pub struct StreamCipher {
    plugin: CryptPlugin,
    encrypt: Keystream,
    decrypt: Keystream,
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher").field("plugin", &self.plugin).finish()
    }
}

impl StreamCipher {
    /// Build the cipher for `plugin`
    ///
    /// `iv` is the plugin-specific data the server sent with its keys.
    pub fn new(plugin: CryptPlugin, session_key: &[u8], iv: Option<&[u8]>) -> Result<Self> {
        Ok(Self {
            plugin,
            encrypt: keystream(plugin, session_key, iv)?,
            decrypt: keystream(plugin, session_key, iv)?,
        })
    }

    /// Plugin in use
    pub fn plugin(&self) -> CryptPlugin {
        self.plugin
    }

    /// Encrypt outgoing bytes in place
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.encrypt.apply(data);
    }

    /// Decrypt incoming bytes in place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.decrypt.apply(data);
    }
}

fn keystream(plugin: CryptPlugin, session_key: &[u8], iv: Option<&[u8]>) -> Result<Keystream> {
    match plugin {
        CryptPlugin::Arc4 => {
            let cipher = Rc4::<U20>::new_from_slice(session_key).map_err(|_| {
                Error::WireCrypt(format!("Arc4 needs a 20-byte key, got {}", session_key.len()))
            })?;
            Ok(Keystream::Arc4(Box::new(cipher)))
        }
        CryptPlugin::ChaCha => {
            let key = Sha256::digest(session_key);
            let iv = iv.ok_or_else(|| Error::WireCrypt("ChaCha requires an IV".to_string()))?;
            let (counter, nonce) = match iv.len() {
                12 => (0u64, iv),
                16 => (u32::from_le_bytes([iv[0], iv[1], iv[2], iv[3]]) as u64, &iv[4..]),
                n => return Err(Error::WireCrypt(format!("ChaCha IV must be 12 or 16 bytes, got {}", n))),
            };
            let mut cipher = ChaCha20::new(key.as_slice().into(), nonce.into());
            seek(&mut cipher, counter)?;
            Ok(Keystream::ChaCha(Box::new(cipher)))
        }
        CryptPlugin::ChaCha64 => {
            let key = Sha256::digest(session_key);
            let iv = iv.ok_or_else(|| Error::WireCrypt("ChaCha64 requires an IV".to_string()))?;
            let (counter, nonce) = match iv.len() {
                8 => (0u64, iv),
                16 => {
                    let mut c = [0u8; 8];
                    c.copy_from_slice(&iv[..8]);
                    (u64::from_le_bytes(c), &iv[8..])
                }
                n => return Err(Error::WireCrypt(format!("ChaCha64 IV must be 8 or 16 bytes, got {}", n))),
            };
            let mut cipher = ChaCha20Legacy::new(key.as_slice().into(), nonce.into());
            seek(&mut cipher, counter)?;
            Ok(Keystream::ChaCha64(Box::new(cipher)))
        }
    }
}

/// Position the keystream at block `counter`
fn seek<C: StreamCipherSeek>(cipher: &mut C, counter: u64) -> Result<()> {
    let pos = counter
        .checked_mul(64)
        .ok_or_else(|| Error::WireCrypt(format!("IV counter {} out of range", counter)))?;
    cipher
        .try_seek(pos)
        .map_err(|_| Error::WireCrypt(format!("IV counter {} out of range", counter)))
}
