//! Authentication plugins
//!
//! The client advertises its allowed plugins in the connect packet and sends
//! the first plugin's initial data straight away. The server either accepts
//! that plugin or names another one, in which case [`ClientAuth`] restarts
//! with the server's choice on the same connection.
//!
//! Plugins form a closed set; [`AuthPlugin::ALL`] is the registry.

use std::fmt;

use tracing::debug;

use crate::crypto::legacy::legacy_password_hash;
use crate::crypto::srp::{normalize_login, ProofHash, ServerChallenge, SrpClient, SESSION_KEY_LEN};
use crate::error::{Error, Result};

/// Authentication plugins known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPlugin {
    /// SRP with a SHA-1 proof
    Srp,
    /// SRP with a SHA-224 proof
    Srp224,
    /// SRP with a SHA-256 proof
    Srp256,
    /// SRP with a SHA-384 proof
    Srp384,
    /// SRP with a SHA-512 proof
    Srp512,
    /// DES-crypt password hash, no session key
    Legacy,
}

impl AuthPlugin {
    /// Every supported plugin
    pub const ALL: [AuthPlugin; 6] = [
        AuthPlugin::Srp512,
        AuthPlugin::Srp384,
        AuthPlugin::Srp256,
        AuthPlugin::Srp224,
        AuthPlugin::Srp,
        AuthPlugin::Legacy,
    ];

    /// Default client allow-list
    pub const DEFAULT: [AuthPlugin; 2] = [AuthPlugin::Srp256, AuthPlugin::Srp];

    /// Name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            AuthPlugin::Srp => "Srp",
            AuthPlugin::Srp224 => "Srp224",
            AuthPlugin::Srp256 => "Srp256",
            AuthPlugin::Srp384 => "Srp384",
            AuthPlugin::Srp512 => "Srp512",
            AuthPlugin::Legacy => "Legacy_Auth",
        }
    }

    /// Look up a plugin by its wire name
    pub fn from_name(name: &str) -> Option<AuthPlugin> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    fn proof_hash(&self) -> Option<ProofHash> {
        match self {
            AuthPlugin::Srp => Some(ProofHash::Sha1),
            AuthPlugin::Srp224 => Some(ProofHash::Sha224),
            AuthPlugin::Srp256 => Some(ProofHash::Sha256),
            AuthPlugin::Srp384 => Some(ProofHash::Sha384),
            AuthPlugin::Srp512 => Some(ProofHash::Sha512),
            AuthPlugin::Legacy => None,
        }
    }
}

impl fmt::Display for AuthPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Space-separated plugin list for the connect packet
pub fn plugin_list(plugins: &[AuthPlugin]) -> String {
    plugins.iter().map(AuthPlugin::name).collect::<Vec<_>>().join(" ")
}

/// Client state of one authentication exchange
pub struct ClientAuth {
    plugin: AuthPlugin,
    allowed: Vec<AuthPlugin>,
    login: String,
    password: String,
    srp: SrpClient,
    session_key: Option<[u8; SESSION_KEY_LEN]>,
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuth")
            .field("plugin", &self.plugin)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl ClientAuth {
    /// Start with the first allowed plugin
    pub fn new(allowed: &[AuthPlugin], user: &str, password: &str) -> Result<Self> {
        let plugin = *allowed
            .first()
            .ok_or_else(|| Error::UnsupportedAuthPlugin("empty plugin list".to_string()))?;
        Ok(Self {
            plugin,
            allowed: allowed.to_vec(),
            login: normalize_login(user),
            password: password.to_string(),
            srp: SrpClient::new(),
            session_key: None,
        })
    }

    /// Plugin currently in use
    pub fn plugin(&self) -> AuthPlugin {
        self.plugin
    }

    /// Allowed plugins in preference order
    pub fn allowed(&self) -> &[AuthPlugin] {
        &self.allowed
    }

    /// Normalized login
    pub fn login(&self) -> &str {
        &self.login
    }

    /// First message of the current plugin
    pub fn initial_data(&self) -> Result<Vec<u8>> {
        match self.plugin {
            AuthPlugin::Legacy => legacy_password_hash(&self.password),
            _ => Ok(self.srp.public_key_hex().into_bytes()),
        }
    }

    /// Switch to the plugin the server asked for
    ///
    /// Returns `true` if the plugin changed; fails if it is not allowed.
    pub fn switch_to(&mut self, name: &str) -> Result<bool> {
        if name.is_empty() || name == self.plugin.name() {
            return Ok(false);
        }
        let plugin = AuthPlugin::from_name(name)
            .filter(|p| self.allowed.contains(p))
            .ok_or_else(|| Error::UnsupportedAuthPlugin(name.to_string()))?;
        debug!(from = %self.plugin, to = %plugin, "server requested different auth plugin");
        self.plugin = plugin;
        self.srp = SrpClient::new();
        self.session_key = None;
        Ok(true)
    }

    /// Answer a server challenge for the current plugin
    pub fn respond(&mut self, server_data: &[u8]) -> Result<Vec<u8>> {
        match self.plugin.proof_hash() {
            None => Err(Error::AuthenticationFailed(
                "unexpected server data for Legacy_Auth".to_string(),
            )),
            Some(hash) => {
                let challenge = ServerChallenge::parse(server_data)?;
                let (proof, key) = self
                    .srp
                    .client_proof(&self.login, &self.password, &challenge, hash);
                self.session_key = Some(key);
                Ok(hex::encode(proof).into_bytes())
            }
        }
    }

    /// Session key shared with the server, once an SRP exchange completed
    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_ref().map(|k| k.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        for p in AuthPlugin::ALL {
            assert_eq!(AuthPlugin::from_name(p.name()), Some(p));
        }
        assert_eq!(AuthPlugin::from_name("Win_Sspi"), None);
        assert_eq!(plugin_list(&AuthPlugin::DEFAULT), "Srp256 Srp");
    }

    #[test]
    fn test_initial_data() {
        let auth = ClientAuth::new(&[AuthPlugin::Srp256], "sysdba", "masterkey").unwrap();
        assert_eq!(auth.login(), "SYSDBA");
        let data = auth.initial_data().unwrap();
        assert!(data.iter().all(|b| b.is_ascii_hexdigit()));

        let legacy = ClientAuth::new(&[AuthPlugin::Legacy], "sysdba", "masterkey").unwrap();
        assert_eq!(legacy.initial_data().unwrap().len(), 11);
    }

    #[test]
    fn test_switch_to() {
        let mut auth = ClientAuth::new(&[AuthPlugin::Srp256, AuthPlugin::Legacy], "u", "p").unwrap();
        assert!(!auth.switch_to("Srp256").unwrap());
        assert!(auth.switch_to("Legacy_Auth").unwrap());
        assert_eq!(auth.plugin(), AuthPlugin::Legacy);
        assert!(matches!(auth.switch_to("Srp"), Err(Error::UnsupportedAuthPlugin(_))));
        assert!(auth.respond(b"anything").is_err());
    }

    #[test]
    fn test_respond_sets_session_key() {
        let mut auth = ClientAuth::new(&[AuthPlugin::Srp], "u", "p").unwrap();
        assert!(auth.session_key().is_none());
        let mut data = vec![2, 0, b'a', b'b', 2, 0];
        data.extend_from_slice(b"7F");
        let proof = auth.respond(&data).unwrap();
        assert_eq!(proof.len(), 40);
        assert_eq!(auth.session_key().map(|k| k.len()), Some(20));
    }

    #[test]
    fn test_empty_allow_list() {
        assert!(ClientAuth::new(&[], "u", "p").is_err());
    }
}
