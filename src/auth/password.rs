//! Argon2id password hashes in PHC string format
//! (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`), so the parameters
//! travel with each hash and can be raised without invalidating old ones.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::Error;

const SALT_LEN: usize = 16;

pub const MIN_LEN: usize = 6;

pub fn hash_password(password: &str) -> crate::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; SALT_LEN]>())
        .map_err(|err| Error::PasswordHash(err.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| Error::PasswordHash(err.to_string()))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for anything that is not a PHC hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(hash) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &hash).is_ok()
}
