//! SRP-6a client used by the `Srp*` authentication plugins
//!
//! The server's first auth data is `salt_len(2, LE) salt key_len(2, LE)
//! hex(B)`. The client answers with `hex(M)`; both sides then share the
//! 20-byte session key `K = SHA1(S)`, which also keys wire encryption.
//!
//! The proof hash varies with the plugin; every other step uses SHA-1.

use num_bigint::BigUint;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

const PRIME_HEX: &str = "E67D2E994B2F900C3F41F08F5BB2627ED0D49EE1FE767A52EFCD565CD6E768812C3E1E9CE8F0A8BEA6CB13CD29DDEBF7A96D4A93B55D488DF099A15C89DCB0640738EB2CBDD9A8F7BAB561AB1B0DC1C6CDABF303264A08D1BCA932D1F1EE428B619D970F342ABA9A65793B8B2F041AE5364350C16F735F56ECBCA87BD57B29E7";
const MULTIPLIER_DEC: &str = "1277432915985975349439481660349303019122249719989";

/// Width of padded group elements
pub const SRP_KEY_SIZE: usize = 128;
/// Length of the session key
pub const SESSION_KEY_LEN: usize = 20;

/// Group prime `N`
pub fn prime() -> BigUint {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).unwrap_or_default()
}

/// Generator `g`
pub fn generator() -> BigUint {
    BigUint::from(2u32)
}

/// Multiplier `k`
pub fn multiplier() -> BigUint {
    BigUint::parse_bytes(MULTIPLIER_DEC.as_bytes(), 10).unwrap_or_default()
}

/// Hash used for the client proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ProofHash {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ProofHash {
    fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut d = D::new();
            for p in parts {
                d.update(p);
            }
            d.finalize().to_vec()
        }
        match self {
            ProofHash::Sha1 => run::<Sha1>(parts),
            ProofHash::Sha224 => run::<Sha224>(parts),
            ProofHash::Sha256 => run::<Sha256>(parts),
            ProofHash::Sha384 => run::<Sha384>(parts),
            ProofHash::Sha512 => run::<Sha512>(parts),
        }
    }
}

fn sha1(parts: &[&[u8]]) -> Vec<u8> {
    ProofHash::Sha1.digest(parts)
}

/// Last `SRP_KEY_SIZE` bytes of the big-endian magnitude
fn pad(n: &BigUint) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    if bytes.len() > SRP_KEY_SIZE {
        bytes[bytes.len() - SRP_KEY_SIZE..].to_vec()
    } else {
        bytes
    }
}

/// Scrambling parameter `u = SHA1(pad(A) || pad(B))`
pub fn scramble(client_public: &BigUint, server_public: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha1(&[&pad(client_public), &pad(server_public)]))
}

/// Private user hash `x = SHA1(salt || SHA1(user ":" password))`
pub fn user_hash(user: &str, password: &str, salt: &[u8]) -> BigUint {
    let inner = sha1(&[user.as_bytes(), b":", password.as_bytes()]);
    BigUint::from_bytes_be(&sha1(&[salt, &inner]))
}

/// Password verifier `v = g^x mod N`
pub fn verifier(user: &str, password: &str, salt: &[u8]) -> BigUint {
    generator().modpow(&user_hash(user, password, salt), &prime())
}

/// Normalize a login the way the server does
///
/// Unquoted names are uppercased; quoted names lose their quotes and
/// doubled quotes collapse.
pub fn normalize_login(login: &str) -> String {
    if login.len() >= 2 && login.starts_with('"') && login.ends_with('"') {
        login[1..login.len() - 1].replace("\"\"", "\"")
    } else {
        login.to_uppercase()
    }
}

/// Salt and public key sent by the server in its first auth data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChallenge {
    /// Salt as sent (hex text bytes)
    pub salt: Vec<u8>,
    /// Server public key `B`
    pub public_key: BigUint,
}

impl ServerChallenge {
    /// Parse `salt_len salt key_len hex(B)`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let short = || Error::AuthenticationFailed("truncated SRP server data".to_string());
        if data.len() < 2 {
            return Err(short());
        }
        let salt_len = u16::from_le_bytes([data[0], data[1]]) as usize;
        let salt = data.get(2..2 + salt_len).ok_or_else(short)?.to_vec();
        let rest = &data[2 + salt_len..];
        if rest.len() < 2 {
            return Err(short());
        }
        let key_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let key_hex = rest.get(2..2 + key_len).ok_or_else(short)?;
        let public_key = BigUint::parse_bytes(key_hex, 16).ok_or_else(|| {
            Error::AuthenticationFailed("server public key is not hex".to_string())
        })?;
        if (&public_key % prime()) == BigUint::default() {
            return Err(Error::AuthenticationFailed(
                "server public key is zero modulo N".to_string(),
            ));
        }
        Ok(Self { salt, public_key })
    }
}

/// Client side of one SRP exchange
#[derive(Clone)]
pub struct SrpClient {
    private_key: BigUint,
    public_key: BigUint,
}

impl std::fmt::Debug for SrpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpClient")
            .field("public_key", &self.public_key.to_str_radix(16))
            .finish_non_exhaustive()
    }
}

impl SrpClient {
    /// New client with a random private key
    pub fn new() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_private_key(&secret)
    }

    /// Client with a fixed private key
    pub fn with_private_key(secret: &[u8]) -> Self {
        let private_key = BigUint::from_bytes_be(secret);
        let public_key = generator().modpow(&private_key, &prime());
        Self {
            private_key,
            public_key,
        }
    }

    /// Public key `A`
    pub fn public_key(&self) -> &BigUint {
        &self.public_key
    }

    /// Public key as hex text, the initial auth data
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.to_bytes_be())
    }

    /// Session key `K = SHA1((B - k*g^x)^(a + u*x) mod N)`
    pub fn session_key(&self, user: &str, password: &str, challenge: &ServerChallenge) -> [u8; SESSION_KEY_LEN] {
        let n = prime();
        let u = scramble(&self.public_key, &challenge.public_key);
        let x = user_hash(user, password, &challenge.salt);
        let kgx = (multiplier() * generator().modpow(&x, &n)) % &n;
        let diff = ((&challenge.public_key % &n) + &n - kgx) % &n;
        let aux = (&self.private_key + (u * &x) % &n) % &n;
        let secret = diff.modpow(&aux, &n);
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(&sha1(&[&secret.to_bytes_be()]));
        key
    }

    /// Client proof and session key for the server's challenge
    ///
    /// `user` must already be normalized.
    pub fn client_proof(
        &self,
        user: &str,
        password: &str,
        challenge: &ServerChallenge,
        hash: ProofHash,
    ) -> (Vec<u8>, [u8; SESSION_KEY_LEN]) {
        let n = prime();
        let key = self.session_key(user, password, challenge);
        let hn = BigUint::from_bytes_be(&sha1(&[&n.to_bytes_be()]));
        let hg = BigUint::from_bytes_be(&sha1(&[&generator().to_bytes_be()]));
        let n1 = hn.modpow(&hg, &n);
        let n2 = sha1(&[user.as_bytes()]);
        let proof = hash.digest(&[
            &n1.to_bytes_be(),
            &n2,
            &challenge.salt,
            &self.public_key.to_bytes_be(),
            &challenge.public_key.to_bytes_be(),
            &key,
        ]);
        (proof, key)
    }
}

impl Default for SrpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_side(user: &str, password: &str, salt: &[u8], client_a: &BigUint) -> (ServerChallenge, [u8; 20]) {
        let n = prime();
        let v = verifier(user, password, salt);
        let b = BigUint::from_bytes_be(&[0x5A; 32]);
        let big_b = (multiplier() * &v + generator().modpow(&b, &n)) % &n;
        let u = scramble(client_a, &big_b);
        let s = ((client_a * v.modpow(&u, &n)) % &n).modpow(&b, &n);
        let mut key = [0u8; 20];
        key.copy_from_slice(&sha1(&[&s.to_bytes_be()]));
        (
            ServerChallenge {
                salt: salt.to_vec(),
                public_key: big_b,
            },
            key,
        )
    }

    #[test]
    fn test_constants() {
        assert_eq!(prime().bits(), 1024);
        assert_eq!(multiplier().to_string(), MULTIPLIER_DEC);
    }

    #[test]
    fn test_session_key_agrees_with_server() {
        let client = SrpClient::with_private_key(&[0x11; 32]);
        let (challenge, server_key) = server_side("SYSDBA", "masterkey", b"0A1B2C", client.public_key());
        assert_eq!(client.session_key("SYSDBA", "masterkey", &challenge), server_key);
        assert_ne!(client.session_key("SYSDBA", "wrong", &challenge), server_key);
    }

    #[test]
    fn test_proof_lengths() {
        let client = SrpClient::new();
        let (challenge, _) = server_side("U", "p", b"ff", client.public_key());
        for (hash, len) in [
            (ProofHash::Sha1, 20),
            (ProofHash::Sha224, 28),
            (ProofHash::Sha256, 32),
            (ProofHash::Sha384, 48),
            (ProofHash::Sha512, 64),
        ] {
            let (proof, key) = client.client_proof("U", "p", &challenge, hash);
            assert_eq!(proof.len(), len);
            assert_eq!(key.len(), 20);
        }
    }

    #[test]
    fn test_parse_challenge() {
        let mut data = vec![4, 0];
        data.extend_from_slice(b"abcd");
        data.extend_from_slice(&[3, 0]);
        data.extend_from_slice(b"1F0");
        let c = ServerChallenge::parse(&data).unwrap();
        assert_eq!(c.salt, b"abcd");
        assert_eq!(c.public_key, BigUint::from(0x1F0u32));
    }

    #[test]
    fn test_parse_challenge_errors() {
        assert!(ServerChallenge::parse(&[]).is_err());
        assert!(ServerChallenge::parse(&[9, 0, 1]).is_err());
        assert!(ServerChallenge::parse(&[1, 0, b'a', 2, 0, b'z', b'z']).is_err());
        assert!(ServerChallenge::parse(&[0, 0, 1, 0, b'0']).is_err());
    }

    #[test]
    fn test_normalize_login() {
        assert_eq!(normalize_login("sysdba"), "SYSDBA");
        assert_eq!(normalize_login("\"MixedCase\""), "MixedCase");
        assert_eq!(normalize_login("\"a\"\"b\""), "a\"b");
    }

    #[test]
    fn test_public_key_hex() {
        let client = SrpClient::with_private_key(&[0]);
        // g^0 = 1
        assert_eq!(client.public_key_hex(), "01");
    }
}
