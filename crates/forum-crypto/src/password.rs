use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use crate::CryptoError;

/// Hash a password with Argon2id and a fresh random salt.
/// Returns the PHC string (algorithm, params, salt and digest in one value).
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::Hashing(e.to_string()))
}

/// Check a password against a stored PHC string.
///
/// A malformed digest and a wrong password both return `false`; callers
/// cannot tell the two apart.
pub fn verify_password(digest: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
