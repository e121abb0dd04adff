//! Invite tokens.
//!
//! The raw token leaves the process once, inside the invite link. Only its
//! SHA-256 digest is stored.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes per token (hex-encoded to 64 characters).
pub const TOKEN_BYTES: usize = 32;

/// Fresh random token from the OS RNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex SHA-256 of a raw token, as stored in `invites.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}
