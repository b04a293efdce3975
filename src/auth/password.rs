//! Per-file password hashing for filedrop.
//!
//! Passwords are stored as `!ENC!` followed by the standard base64 encoding
//! of the SHA-256 digest of the raw password bytes. The marker is how a
//! stored value is told apart from a plaintext one, which keeps hashing
//! idempotent across saves.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Marker prefixed to every hashed password.
pub const HASH_MARKER: &str = "!ENC!";

/// Hash a plaintext password.
///
/// # Examples
///
/// ```
/// use filedrop::auth::hash_password;
///
/// let hash = hash_password("s3cret");
/// assert!(hash.starts_with("!ENC!"));
/// assert_eq!(hash, hash_password("s3cret"));
/// ```
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("{HASH_MARKER}{}", STANDARD.encode(digest))
}

/// Whether a stored value is already in hashed form.
pub fn is_hashed(value: &str) -> bool {
    value.starts_with(HASH_MARKER)
}

/// Hash a value unless it already carries the marker.
pub fn ensure_hashed(value: &str) -> String {
    if is_hashed(value) {
        value.to_string()
    } else {
        hash_password(value)
    }
}

/// Check a candidate password against a stored hash.
///
/// The comparison is byte-for-byte on the encoded form.
pub fn verify_password(candidate: &str, stored_hash: &str) -> bool {
    hash_password(candidate).as_bytes() == stored_hash.as_bytes()
}
