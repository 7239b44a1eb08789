use std::sync::atomic::{AtomicUsize, Ordering};

use super::credentials::{CredentialError, CredentialHasher};

/// Reversible stand-in so unit tests do not pay for Argon2. Counts verifications.
#[derive(Debug, Default)]
pub(crate) struct PlainHasher {
    verifications: AtomicUsize,
}

impl PlainHasher {
    pub(crate) fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl CredentialHasher for PlainHasher {
    fn hash(&self, credential: &str) -> Result<String, CredentialError> {
        Ok(format!("plain:{credential}"))
    }

    fn verify(&self, stored: &str, credential: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        stored == format!("plain:{credential}")
    }
}
