//! Process-wide context owning the stores, built once at startup and passed explicitly.

mod error;

pub use error::DeskError;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::applications::{
    Application, ApplicationId, ApplicationPatch, ApplicationRegistry, ApplicationSummary,
    StatusFilter, Verdict, WorkflowEngine,
};
use crate::authz::{self, Action};
use crate::config::AuthConfig;
use crate::identity::{
    Argon2Hasher, CredentialHasher, IdentityStore, InMemorySessionManager, Role, SessionManager,
    SessionToken, User, UserId, UserPatch, UserSummary,
};

/// Accounts created by [`AidDesk::seed_demo`]: name, email, role, and whether the account
/// still has to change its credential.
pub const DEMO_ACCOUNTS: [(&str, &str, Role, bool); 4] = [
    ("Admin User", "admin@example.com", Role::Admin, false),
    ("Counselor User", "counselor@example.com", Role::Counselor, false),
    ("Approver User", "approver@example.com", Role::Approver, false),
    ("New User", "new@example.com", Role::Counselor, true),
];

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    pub token: SessionToken,
}

/// Account creation request issued by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password: String,
}

/// Role-scoped dashboard figures.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub role: Role,
    pub applications: ApplicationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<UserSummary>,
}

/// Owns the identity store, application registry, workflow engine and session capability.
pub struct AidDesk<S = InMemorySessionManager> {
    identity: IdentityStore,
    workflow: WorkflowEngine,
    sessions: Arc<S>,
}

impl AidDesk<InMemorySessionManager> {
    /// Desk wired with Argon2 hashing and in-memory sessions.
    pub fn from_config(config: &AuthConfig) -> Self {
        let sessions = InMemorySessionManager::new(config.session_ttl());
        Self::new(
            Arc::new(Argon2Hasher),
            config.min_credential_length,
            Arc::new(sessions),
        )
    }
}

impl<S> AidDesk<S>
where
    S: SessionManager + 'static,
{
    pub fn new(
        hasher: Arc<dyn CredentialHasher>,
        min_credential_length: usize,
        sessions: Arc<S>,
    ) -> Self {
        let registry = Arc::new(ApplicationRegistry::new());
        Self {
            identity: IdentityStore::new(hasher, min_credential_length),
            workflow: WorkflowEngine::new(registry),
            sessions,
        }
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn registry(&self) -> &ApplicationRegistry {
        self.workflow.registry()
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    pub fn login(&self, email: &str, credential: &str) -> Result<LoginOutcome, DeskError> {
        let user = self.identity.verify_credential(email, credential).map_err(|err| {
            warn!(error = %err, "login rejected");
            err
        })?;
        let token = self.sessions.issue(&user.id);
        info!(user_id = %user.id, role = %user.role, "session issued");
        Ok(LoginOutcome { user, token })
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.invalidate(token)
    }

    /// Resolves a bearer token to the current state of its account.
    pub fn authenticate(&self, token: &str) -> Result<User, DeskError> {
        let user_id = self
            .sessions
            .authenticate(token)
            .ok_or(DeskError::Unauthenticated)?;
        self.identity
            .get(&user_id)
            .map_err(|_| DeskError::Unauthenticated)
    }

    pub fn change_credential(
        &self,
        principal: &User,
        current: &str,
        replacement: &str,
    ) -> Result<User, DeskError> {
        self.identity
            .change_credential(&principal.id, current, replacement)
    }

    pub fn list_users(&self, principal: &User) -> Result<Vec<User>, DeskError> {
        authz::require(principal, Action::ManageUsers, None)?;
        Ok(self.identity.list_users())
    }

    pub fn create_user(&self, principal: &User, request: NewUser) -> Result<User, DeskError> {
        authz::require(principal, Action::ManageUsers, None)?;
        self.identity
            .create_user(&request.name, &request.email, request.role, &request.password)
    }

    pub fn update_user(
        &self,
        principal: &User,
        id: &UserId,
        patch: UserPatch,
    ) -> Result<User, DeskError> {
        authz::require(principal, Action::ManageUsers, None)?;
        self.identity.update_user(id, patch)
    }

    pub fn delete_user(&self, principal: &User, id: &UserId) -> Result<(), DeskError> {
        authz::require(principal, Action::ManageUsers, None)?;
        self.identity.delete_user(id)?;
        let dropped = self.sessions.invalidate_user(id);
        info!(user_id = %id, sessions = dropped, "sessions revoked for deleted user");
        Ok(())
    }

    pub fn create_application(
        &self,
        principal: &User,
        student_name: &str,
        amount: f64,
        purpose: &str,
    ) -> Result<Application, DeskError> {
        self.registry()
            .create(principal, student_name, amount, purpose)
    }

    pub fn application(
        &self,
        principal: &User,
        id: &ApplicationId,
    ) -> Result<Application, DeskError> {
        self.registry().get(principal, id)
    }

    pub fn applications(
        &self,
        principal: &User,
        filter: StatusFilter,
    ) -> Result<Vec<Application>, DeskError> {
        self.registry().list_filtered(principal, filter)
    }

    pub fn update_application(
        &self,
        principal: &User,
        id: &ApplicationId,
        patch: ApplicationPatch,
    ) -> Result<Application, DeskError> {
        self.registry().update(principal, id, patch)
    }

    pub fn review(
        &self,
        principal: &User,
        id: &ApplicationId,
        verdict: Verdict,
        reason: &str,
    ) -> Result<Application, DeskError> {
        self.workflow.review(principal, id, verdict, reason)
    }

    pub fn dashboard(&self, principal: &User) -> Result<Dashboard, DeskError> {
        let applications = self.registry().summary(principal)?;
        let users = authz::can(principal, Action::ManageUsers, None)
            .then(|| self.identity.summary());
        Ok(Dashboard {
            role: principal.role,
            applications,
            users,
        })
    }

    /// Creates the first administrator. The account must change its credential on first login.
    pub fn bootstrap_admin(&self, email: &str, credential: &str) -> Result<User, DeskError> {
        let admin = self
            .identity
            .create_user("Administrator", email, Role::Admin, credential)?;
        info!(user_id = %admin.id, "bootstrap administrator created");
        Ok(admin)
    }

    /// Seeds [`DEMO_ACCOUNTS`] sharing `credential`.
    pub fn seed_demo(&self, credential: &str) -> Result<Vec<User>, DeskError> {
        let mut seeded = Vec::with_capacity(DEMO_ACCOUNTS.len());
        for (name, email, role, first_login) in DEMO_ACCOUNTS {
            let mut user = self.identity.create_user(name, email, role, credential)?;
            if !first_login {
                user = self
                    .identity
                    .change_credential(&user.id, credential, credential)?;
            }
            seeded.push(user);
        }
        info!(accounts = seeded.len(), "demo accounts seeded");
        Ok(seeded)
    }
}
