/// Forum Crypto Library
///
/// Password hashing for stored credentials and the random tokens that
/// identify sessions. Everything here is a pure function: no shared state,
/// safe to call from any thread. Argon2 is CPU-heavy, so async callers should
/// run `hash_password` / `verify_password` on a blocking thread.

pub mod password;
pub mod token;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}
