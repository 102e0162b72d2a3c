//! Authentication scrambles.
//!
//! - mysql_native_password (SHA1, the MariaDB default)
//! - caching_sha2_password (SHA256, MySQL 8 servers)

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{MariaError, MariaResult};

pub const NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2: &str = "caching_sha2_password";
pub const CLEAR_PASSWORD: &str = "mysql_clear_password";

/// SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
pub fn mysql_native_password(password: &[u8], scramble: &[u8]) -> [u8; 20] {
    let hash1 = Sha1::digest(password);
    let hash2 = Sha1::digest(hash1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    let mut result = [0u8; 20];
    for (out, (a, b)) in result.iter_mut().zip(hash1.iter().zip(hash3.iter())) {
        *out = a ^ b;
    }
    result
}

/// SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)
pub fn caching_sha2_password(password: &[u8], scramble: &[u8]) -> [u8; 32] {
    let hash1 = Sha256::digest(password);
    let hash2 = Sha256::digest(hash1);

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(scramble);
    let hash3 = hasher.finalize();

    let mut result = [0u8; 32];
    for (out, (a, b)) in result.iter_mut().zip(hash1.iter().zip(hash3.iter())) {
        *out = a ^ b;
    }
    result
}

/// Auth response for `plugin`. An empty password always sends an empty response.
pub fn scramble(plugin: &str, password: &str, scramble: &[u8]) -> MariaResult<Vec<u8>> {
    if password.is_empty() {
        return Ok(Vec::new());
    }
    match plugin {
        NATIVE_PASSWORD | "" => Ok(mysql_native_password(password.as_bytes(), scramble).to_vec()),
        CACHING_SHA2 => Ok(caching_sha2_password(password.as_bytes(), scramble).to_vec()),
        CLEAR_PASSWORD => {
            let mut clear = password.as_bytes().to_vec();
            clear.push(0);
            Ok(clear)
        }
        other => Err(MariaError::Auth(format!(
            "unsupported authentication plugin '{}'",
            other
        ))),
    }
}
