//! Password hashing for accounts created on invite acceptance.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::error::{CoreError, CoreResult};

/// Turns a plaintext password into a storable hash.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> CoreResult<String>;
}

/// Argon2id in PHC string format.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Argon2id with 19 MiB memory, 2 iterations, 1 lane, 32-byte output.
    pub fn new() -> CoreResult<Self> {
        let params = Params::new(19456, 2, 1, Some(32))
            .map_err(|e| CoreError::PasswordHash(format!("Failed to build Argon2 params: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Check a password against a stored hash.
    pub fn verify(&self, password: &str, hash: &str) -> CoreResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CoreError::PasswordHash(format!("Failed to parse password hash: {}", e)))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CoreError::PasswordHash(e.to_string())),
        }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> CoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CoreError::PasswordHash(format!("Failed to hash password: {}", e)))
    }
}
