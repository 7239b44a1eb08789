//! Accounts, credentials, and the session capability.

pub mod credentials;
pub mod domain;
pub mod session;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use credentials::{Argon2Hasher, CredentialError, CredentialHasher};
pub use domain::{Role, UnknownRole, User, UserId, UserPatch, UserSummary};
pub use session::{InMemorySessionManager, SessionManager, SessionToken};
pub use store::{IdentityStore, DEFAULT_MIN_CREDENTIAL_LENGTH};
