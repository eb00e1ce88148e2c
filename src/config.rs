//! Connection configuration and connection string parsing
//!
//! Supports the classic Firebird connection string format:
//! - `host:/path/to/db.fdb`
//! - `host/3051:/path/to/db.fdb`
//! - `host:C:\path\db.fdb`
//! - `/path/to/db.fdb` or `employee` (alias on localhost)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthPlugin;
use crate::crypto::CryptPlugin;
use crate::error::{Error, Result};

/// Default server port
pub const DEFAULT_PORT: u16 = 3050;

/// Default rows requested per fetch
pub const DEFAULT_FETCH_SIZE: u32 = 400;

/// Default largest blob the server may send inline (64 KiB)
pub const DEFAULT_MAX_INLINE_BLOB_SIZE: u32 = 64 * 1024;

/// Default byte budget of a transaction's inline blob cache (10 MiB)
pub const DEFAULT_BLOB_CACHE_SIZE: usize = 10 * 1024 * 1024;

/// Default connection character set
pub const DEFAULT_CHARSET: &str = "UTF8";

/// Default SQL dialect
pub const DEFAULT_DIALECT: u32 = 3;

/// Protocol versions offered by default, most preferred first
pub const DEFAULT_PROTOCOL_VERSIONS: [u8; 7] = [19, 18, 17, 16, 15, 14, 13];

/// Lowest and highest protocol versions the client can speak
pub const SUPPORTED_PROTOCOL_VERSIONS: std::ops::RangeInclusive<u8> = 10..=19;

/// Wire encryption level requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireCrypt {
    /// Never encrypt
    Disabled,
    /// Encrypt when the server offers a usable plugin
    #[default]
    Enabled,
    /// Fail the handshake unless encryption is negotiated
    Required,
}

impl WireCrypt {
    /// Value of the `CNCT_client_crypt` item
    pub fn wire_value(&self) -> i32 {
        match self {
            WireCrypt::Disabled => 0,
            WireCrypt::Enabled => 1,
            WireCrypt::Required => 2,
        }
    }
}

/// How result sets are traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStrategy {
    /// Stream rows forward in batches
    #[default]
    ForwardOnly,
    /// Server-side scrollable cursor (`op_fetch_scroll`)
    ServerScrollable,
    /// Read the whole result into memory on first access
    ClientCached,
}

/// Connection configuration
///
/// # Examples
///
/// ```rust
/// use firebird_rs::Config;
/// use std::time::Duration;
///
/// let config = Config::new("localhost", "/data/employee.fdb", "SYSDBA", "masterkey")
///     .port(3051)
///     .connect_timeout(Duration::from_secs(5))
///     .fetch_size(200);
/// assert_eq!(config.to_string(), "localhost/3051:/data/employee.fdb");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// Database path or alias on the server
    pub database: String,
    /// User name
    pub username: String,
    /// Password (kept private)
    password: String,
    /// Connect and handshake timeout
    pub connect_timeout: Duration,
    /// Default statement timeout, `None` for no limit
    pub statement_timeout: Option<Duration>,
    /// Protocol versions offered, most preferred first
    pub protocol_versions: Vec<u8>,
    /// Authentication plugins allowed, most preferred first
    pub auth_plugins: Vec<AuthPlugin>,
    /// Wire encryption level
    pub wire_crypt: WireCrypt,
    /// Crypt plugins allowed
    pub crypt_plugins: Vec<CryptPlugin>,
    /// Largest blob the server may send inline (protocol 19+)
    pub max_inline_blob_size: u32,
    /// Byte budget of each transaction's inline blob cache
    pub blob_cache_size: usize,
    /// Whether statements prefetch rows asynchronously
    pub async_fetch: bool,
    /// Rows requested per fetch
    pub fetch_size: u32,
    /// Default cursor strategy
    pub cursor_strategy: CursorStrategy,
    /// Connection character set
    pub charset: String,
    /// SQL dialect
    pub dialect: u32,
}

impl Config {
    /// Create a configuration with defaults for everything but the target
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default statement timeout
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Restrict the offered protocol versions
    pub fn protocol_versions(mut self, versions: impl Into<Vec<u8>>) -> Self {
        self.protocol_versions = versions.into();
        self
    }

    /// Restrict the allowed authentication plugins
    pub fn auth_plugins(mut self, plugins: impl Into<Vec<AuthPlugin>>) -> Self {
        self.auth_plugins = plugins.into();
        self
    }

    /// Set the wire encryption level
    pub fn wire_crypt(mut self, level: WireCrypt) -> Self {
        self.wire_crypt = level;
        self
    }

    /// Restrict the allowed crypt plugins
    pub fn crypt_plugins(mut self, plugins: impl Into<Vec<CryptPlugin>>) -> Self {
        self.crypt_plugins = plugins.into();
        self
    }

    /// Set the largest inline blob; 0 disables inline blobs
    pub fn max_inline_blob_size(mut self, size: u32) -> Self {
        self.max_inline_blob_size = size;
        self
    }

    /// Set the inline blob cache budget
    pub fn blob_cache_size(mut self, size: usize) -> Self {
        self.blob_cache_size = size;
        self
    }

    /// Enable or disable asynchronous prefetch
    pub fn async_fetch(mut self, enabled: bool) -> Self {
        self.async_fetch = enabled;
        self
    }

    /// Set rows requested per fetch
    pub fn fetch_size(mut self, size: u32) -> Self {
        self.fetch_size = size.max(1);
        self
    }

    /// Set the default cursor strategy
    pub fn cursor_strategy(mut self, strategy: CursorStrategy) -> Self {
        self.cursor_strategy = strategy;
        self
    }

    /// Set the connection character set
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Set the SQL dialect
    pub fn dialect(mut self, dialect: u32) -> Self {
        self.dialect = dialect;
        self
    }

    /// Get the password (for authentication)
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Set the password
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    /// Set the username
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the configuration before connecting
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(Error::InvalidConnectionString("missing database".to_string()));
        }
        if self.protocol_versions.is_empty() {
            return Err(Error::InvalidConnectionString("no protocol versions offered".to_string()));
        }
        if let Some(v) = self
            .protocol_versions
            .iter()
            .find(|v| !SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        {
            return Err(Error::UnsupportedProtocolVersion(u32::from(*v)));
        }
        if self.auth_plugins.is_empty() {
            return Err(Error::UnsupportedAuthPlugin("no plugins allowed".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: None,
            protocol_versions: DEFAULT_PROTOCOL_VERSIONS.to_vec(),
            auth_plugins: AuthPlugin::DEFAULT.to_vec(),
            wire_crypt: WireCrypt::Enabled,
            crypt_plugins: CryptPlugin::ALL.to_vec(),
            max_inline_blob_size: DEFAULT_MAX_INLINE_BLOB_SIZE,
            blob_cache_size: DEFAULT_BLOB_CACHE_SIZE,
            async_fetch: true,
            fetch_size: DEFAULT_FETCH_SIZE,
            cursor_strategy: CursorStrategy::ForwardOnly,
            charset: DEFAULT_CHARSET.to_string(),
            dialect: DEFAULT_DIALECT,
        }
    }
}

/// A single letter followed by `:` is a Windows drive, not a host
fn is_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Parse a `host[/port]:database` connection string
impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(Error::InvalidConnectionString(
                "empty connection string".to_string(),
            ));
        }

        let mut config = Config::default();

        let colon = if is_drive_prefix(s) { None } else { s.find(':') };
        match colon {
            None => config.database = s.to_string(),
            Some(pos) => {
                let host_port = &s[..pos];
                config.database = s[pos + 1..].to_string();

                if let Some((host, port)) = host_port.split_once('/') {
                    config.host = host.to_string();
                    config.port = port.parse().map_err(|_| {
                        Error::InvalidConnectionString("invalid port number".to_string())
                    })?;
                } else {
                    config.host = host_port.to_string();
                }
            }
        }

        if config.host.is_empty() {
            return Err(Error::InvalidConnectionString("missing host".to_string()));
        }
        if config.database.is_empty() {
            return Err(Error::InvalidConnectionString("missing database".to_string()));
        }

        Ok(config)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_PORT {
            write!(f, "{}:{}", self.host, self.database)
        } else {
            write!(f, "{}/{}:{}", self.host, self.port, self.database)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_path() {
        let config: Config = "dbhost:/var/lib/firebird/test.fdb".parse().unwrap();
        assert_eq!(config.host, "dbhost");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database, "/var/lib/firebird/test.fdb");
    }

    #[test]
    fn test_parse_with_port() {
        let config: Config = "dbhost/3051:employee".parse().unwrap();
        assert_eq!(config.host, "dbhost");
        assert_eq!(config.port, 3051);
        assert_eq!(config.database, "employee");
    }

    #[test]
    fn test_parse_windows_path() {
        let config: Config = "winhost:C:\\data\\test.fdb".parse().unwrap();
        assert_eq!(config.host, "winhost");
        assert_eq!(config.database, "C:\\data\\test.fdb");

        let local: Config = "C:\\data\\test.fdb".parse().unwrap();
        assert_eq!(local.host, "localhost");
        assert_eq!(local.database, "C:\\data\\test.fdb");
    }

    #[test]
    fn test_parse_alias_only() {
        let config: Config = "employee".parse().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.database, "employee");
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Config>().is_err());
        assert!("host/notaport:db".parse::<Config>().is_err());
        assert!(":db".parse::<Config>().is_err());
        assert!("host:".parse::<Config>().is_err());
    }

    #[test]
    fn test_config_display() {
        let config = Config::new("myhost", "employee", "user", "pass");
        assert_eq!(config.to_string(), "myhost:employee");
        assert_eq!(config.port(3051).to_string(), "myhost/3051:employee");
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = Config::new("host", "db", "user", "pass")
            .connect_timeout(Duration::from_secs(30))
            .wire_crypt(WireCrypt::Required)
            .fetch_size(0)
            .async_fetch(false)
            .cursor_strategy(CursorStrategy::ClientCached);

        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.wire_crypt, WireCrypt::Required);
        assert_eq!(config.fetch_size, 1);
        assert!(!config.async_fetch);
        assert_eq!(config.cursor_strategy, CursorStrategy::ClientCached);
        assert_eq!(config.password(), "pass");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.protocol_versions, vec![19, 18, 17, 16, 15, 14, 13]);
        assert_eq!(config.auth_plugins, vec![AuthPlugin::Srp256, AuthPlugin::Srp]);
        assert_eq!(config.max_inline_blob_size, 64 * 1024);
        assert_eq!(config.charset, "UTF8");
    }

    #[test]
    fn test_validate() {
        let config = Config::new("h", "db", "u", "p");
        assert!(config.validate().is_ok());
        assert!(config.clone().protocol_versions(vec![9]).validate().is_err());
        assert!(config.clone().protocol_versions(Vec::new()).validate().is_err());
        assert!(Config::default().validate().is_err());
    }
}
