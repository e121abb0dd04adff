//! Invites: token issuance, account creation and grant on acceptance.

mod email;
mod password;
mod service;
mod token;

pub use email::EmailAddress;
pub use password::{Argon2Hasher, PasswordHasher};
pub use service::InviteService;
pub use token::{generate_token, hash_token, TOKEN_BYTES};
