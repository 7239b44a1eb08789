use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hashing backend failure; the message is logged, never returned to callers.
#[derive(Debug, thiserror::Error)]
#[error("credential hashing failed: {0}")]
pub struct CredentialError(pub String);

/// Pluggable password hashing capability consumed by the identity store.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, credential: &str) -> Result<String, CredentialError>;
    fn verify(&self, stored: &str, credential: &str) -> bool;
}

/// Argon2id with the crate defaults and a random 16 byte salt.
#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, credential: &str) -> Result<String, CredentialError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|err| CredentialError(err.to_string()))?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|err| CredentialError(err.to_string()))?;
        let phc = Argon2::default()
            .hash_password(credential.as_bytes(), &salt)
            .map_err(|err| CredentialError(err.to_string()))?
            .to_string();
        Ok(phc)
    }

    fn verify(&self, stored: &str, credential: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(credential.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
