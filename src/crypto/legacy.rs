//! Legacy_Auth password hash
//!
//! The password is hashed with traditional Unix DES `crypt` using the fixed
//! salt `9z`; the two salt characters are stripped before sending.

use crate::error::{Error, Result};

const LEGACY_SALT: &str = "9z";

/// Hash a password for Legacy_Auth
pub fn legacy_password_hash(password: &str) -> Result<Vec<u8>> {
    let hashed = pwhash::unix_crypt::hash_with(LEGACY_SALT, password)
        .map_err(|e| Error::AuthenticationFailed(format!("legacy hash failed: {}", e)))?;
    hashed
        .get(2..)
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| Error::AuthenticationFailed("legacy hash too short".to_string()))
}
