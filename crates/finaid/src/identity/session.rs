use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::domain::UserId;

/// Opaque bearer token handed to clients after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

/// Token issuing and validation capability.
///
/// Implementations only map tokens to account ids; resolving the id to a live principal is
/// the desk's job so role changes and deletions take effect immediately.
pub trait SessionManager: Send + Sync {
    fn issue(&self, user_id: &UserId) -> SessionToken;
    fn authenticate(&self, token: &str) -> Option<UserId>;
    fn invalidate(&self, token: &str) -> bool;
    fn invalidate_user(&self, user_id: &UserId) -> usize;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: UserId,
    expires_at: DateTime<Utc>,
}

/// Process-local session table with a fixed time-to-live.
#[derive(Debug)]
pub struct InMemorySessionManager {
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl InMemorySessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn active_sessions(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

impl Default for InMemorySessionManager {
    fn default() -> Self {
        Self::new(Duration::hours(8))
    }
}

impl SessionManager for InMemorySessionManager {
    fn issue(&self, user_id: &UserId) -> SessionToken {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            token.clone(),
            SessionEntry {
                user_id: user_id.clone(),
                expires_at: now
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        SessionToken(token)
    }

    fn authenticate(&self, token: &str) -> Option<UserId> {
        let entry = self.sessions.read().get(token).cloned()?;
        if entry.expires_at > Utc::now() {
            Some(entry.user_id)
        } else {
            self.sessions.write().remove(token);
            None
        }
    }

    fn invalidate(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    fn invalidate_user(&self, user_id: &UserId) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.user_id != *user_id);
        before - sessions.len()
    }
}
