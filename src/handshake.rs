//! Connection handshake
//!
//! Drives `op_connect` through version selection, authentication and
//! optional wire encryption:
//!
//! ```text
//! Connecting -> VersionNegotiating -> Authenticating -> (CryptoNegotiating) -> Ready
//! ```
//!
//! Any failure moves to `Failed`. The caller owns the channel and must close
//! it when [`Handshake::run`] returns an error.

use std::fmt;

use tracing::{debug, warn};

use crate::auth::{AuthPlugin, ClientAuth};
use crate::config::{Config, WireCrypt};
use crate::constants::key_tag;
use crate::crypto::{CryptPlugin, ServerKeys, StreamCipher};
use crate::error::{Error, Result};
use crate::messages::{
    cont_auth_request, crypt_request, AcceptMessage, ConnectMessage, HandshakeReply, Response,
};
use crate::transport::WireChannel;

/// Authentication rounds allowed before giving up
const MAX_AUTH_ROUNDS: usize = 8;

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// `op_connect` not yet sent
    Connecting,
    /// Waiting for the server to pick a protocol version
    VersionNegotiating,
    /// Exchanging authentication data
    Authenticating,
    /// Switching the channel to wire encryption
    CryptoNegotiating,
    /// Authenticated; ready to attach
    Ready,
    /// Handshake failed
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Connecting => "connecting",
            HandshakeState::VersionNegotiating => "version negotiating",
            HandshakeState::Authenticating => "authenticating",
            HandshakeState::CryptoNegotiating => "crypto negotiating",
            HandshakeState::Ready => "ready",
            HandshakeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the handshake negotiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Protocol version selected by the server
    pub protocol_version: u8,
    /// Whether the server accepted lazy send
    pub lazy_send: bool,
    /// Plugin that completed authentication; `None` if the server skipped
    /// wire authentication
    pub auth_plugin: Option<AuthPlugin>,
    /// Active wire cipher
    pub crypt_plugin: Option<CryptPlugin>,
    /// Normalized login to put in the DPB
    pub login: String,
}

impl Negotiated {
    /// Whether credentials must be sent in the DPB
    pub fn needs_dpb_password(&self) -> bool {
        self.auth_plugin.is_none()
    }
}

/// Client side of the handshake
#[derive(Debug)]
pub struct Handshake<'a> {
    config: &'a Config,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Prepare a handshake for `config`
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            state: HandshakeState::Connecting,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn transition(&mut self, to: HandshakeState) {
        debug!(from = %self.state, to = %to, "handshake state");
        self.state = to;
    }

    /// Run the handshake to `Ready`
    pub async fn run(&mut self, channel: &mut WireChannel) -> Result<Negotiated> {
        match self.negotiate(channel).await {
            Ok(negotiated) => {
                self.transition(HandshakeState::Ready);
                Ok(negotiated)
            }
            Err(e) => {
                debug!(error = %e, state = %self.state, "handshake failed");
                self.transition(HandshakeState::Failed);
                Err(e)
            }
        }
    }

    async fn negotiate(&mut self, channel: &mut WireChannel) -> Result<Negotiated> {
        let config = self.config;
        let mut auth = ClientAuth::new(&config.auth_plugins, &config.username, config.password())?;

        let connect = ConnectMessage {
            database: config.database.clone(),
            versions: config.protocol_versions.clone(),
            login: auth.login().to_string(),
            plugin: auth.plugin(),
            plugins: auth.allowed().to_vec(),
            specific_data: auth.initial_data()?,
            wire_crypt: config.wire_crypt,
            os_user: os_user(),
            host: host_name(),
        };
        channel.send(connect.build_request()?).await?;
        self.transition(HandshakeState::VersionNegotiating);

        let (accept, wire_auth) = match channel.receive(HandshakeReply::decode).await? {
            HandshakeReply::Accept(a) => (a, false),
            HandshakeReply::AcceptData(a) | HandshakeReply::CondAccept(a) => (a, true),
            HandshakeReply::Reject => return Err(Error::ConnectionRejected),
            HandshakeReply::Response(r) => return Err(attach_error(r)),
            HandshakeReply::ContAuth(_) => {
                return Err(Error::protocol("op_cont_auth before protocol selection"))
            }
        };
        if !config.protocol_versions.contains(&accept.version) {
            return Err(Error::UnsupportedProtocolVersion(u32::from(accept.version)));
        }
        debug!(
            version = accept.version,
            lazy_send = accept.lazy_send(),
            plugin = %accept.plugin,
            "protocol accepted"
        );
        self.transition(HandshakeState::Authenticating);

        let mut keys = ServerKeys::default();
        let auth_plugin = if wire_auth {
            self.authenticate(channel, &mut auth, &accept, &mut keys).await?;
            Some(auth.plugin())
        } else {
            debug!("server skipped wire authentication");
            None
        };

        let crypt_plugin = self.negotiate_crypt(channel, &auth, &keys).await?;

        Ok(Negotiated {
            protocol_version: accept.version,
            lazy_send: accept.lazy_send(),
            auth_plugin,
            crypt_plugin,
            login: auth.login().to_string(),
        })
    }

    async fn authenticate(
        &mut self,
        channel: &mut WireChannel,
        auth: &mut ClientAuth,
        accept: &AcceptMessage,
        keys: &mut ServerKeys,
    ) -> Result<()> {
        keys.merge(ServerKeys::parse(&accept.keys)?);
        if accept.authenticated {
            auth.switch_to(&accept.plugin)?;
            return Ok(());
        }

        let mut server_plugin = accept.plugin.clone();
        let mut server_data = accept.data.clone();
        for _ in 0..MAX_AUTH_ROUNDS {
            let data = if auth.switch_to(&server_plugin)? || server_data.is_empty() {
                auth.initial_data()?
            } else {
                auth.respond(&server_data)?
            };
            channel
                .send(cont_auth_request(&data, auth.plugin(), auth.allowed()))
                .await?;

            match channel.receive(HandshakeReply::decode).await? {
                HandshakeReply::ContAuth(c) => {
                    keys.merge(ServerKeys::parse(&c.keys)?);
                    server_plugin = c.plugin;
                    server_data = c.data;
                }
                HandshakeReply::Response(r) => {
                    if r.is_error() {
                        return Err(attach_error(r));
                    }
                    if !r.data.is_empty() {
                        keys.merge(ServerKeys::parse(&r.data)?);
                    }
                    debug!(plugin = %auth.plugin(), "authenticated");
                    return Ok(());
                }
                HandshakeReply::Reject => return Err(Error::ConnectionRejected),
                _ => return Err(Error::protocol("unexpected accept during authentication")),
            }
        }
        Err(Error::AuthenticationFailed(format!(
            "no result after {} rounds",
            MAX_AUTH_ROUNDS
        )))
    }

    async fn negotiate_crypt(
        &mut self,
        channel: &mut WireChannel,
        auth: &ClientAuth,
        keys: &ServerKeys,
    ) -> Result<Option<CryptPlugin>> {
        let level = self.config.wire_crypt;
        if level == WireCrypt::Disabled {
            return Ok(None);
        }

        let session_key = auth.session_key();
        let plugin = keys.select(&self.config.crypt_plugins);
        let (key, plugin) = match (session_key, plugin) {
            (Some(key), Some(plugin)) => (key, plugin),
            _ if level == WireCrypt::Required => {
                return Err(Error::WireCrypt(format!(
                    "no usable plugin (session key: {}, server keys: {})",
                    session_key.is_some(),
                    keys.keys.len()
                )));
            }
            _ => {
                debug!("wire encryption not available");
                return Ok(None);
            }
        };

        let iv = keys.specific_data.get(plugin.name()).map(Vec::as_slice);
        if plugin.requires_iv() && iv.is_none() {
            if level == WireCrypt::Required {
                return Err(Error::WireCrypt(format!("server sent no IV for {}", plugin)));
            }
            warn!(plugin = %plugin, "server sent no IV, continuing unencrypted");
            return Ok(None);
        }

        self.transition(HandshakeState::CryptoNegotiating);
        let cipher = StreamCipher::new(plugin, key, iv)?;
        channel
            .send(crypt_request(plugin.name(), key_tag::SYMMETRIC))
            .await?;
        channel.enable_cipher(cipher)?;

        let response = channel.receive(Response::decode).await?;
        if response.is_error() {
            return Err(Error::WireCrypt(response.status.to_string()));
        }
        debug!(plugin = %plugin, "wire encryption enabled");
        Ok(Some(plugin))
    }
}

fn attach_error(response: Response) -> Error {
    if response.is_error() {
        Error::Attach(response.status)
    } else {
        Error::protocol("unexpected op_response during handshake")
    }
}

fn os_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}
