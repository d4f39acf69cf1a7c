//! Salted SHA-1 hashing for the `userPassword` attribute.
//!
//! Produces the `{SSHA}` form understood by common directory servers:
//! base64 over the SHA-1 digest of password-then-salt, with the salt
//! appended to the digest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};

const SALT_LEN: usize = 4;

/// Hashes a password with a fresh random salt.
#[must_use]
pub fn salted_sha1(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    with_salt(password, &salt)
}

fn with_salt(password: &str, salt: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let digest = hasher.finalize();

    let mut blob = Vec::with_capacity(digest.len() + salt.len());
    blob.extend_from_slice(&digest);
    blob.extend_from_slice(salt);
    format!("{{SSHA}}{}", STANDARD.encode(blob))
}
