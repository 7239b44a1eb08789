use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::credentials::{CredentialError, CredentialHasher};
use super::domain::{normalize_email, Role, User, UserId, UserPatch, UserSummary};
use crate::desk::DeskError;

/// Minimum credential length applied when no configuration overrides it.
pub const DEFAULT_MIN_CREDENTIAL_LENGTH: usize = 8;

const DECOY_CREDENTIAL: &str = "decoy-credential-for-unknown-accounts";

struct Account {
    user: User,
    credential: String,
    deleted: bool,
}

#[derive(Default)]
struct Accounts {
    order: Vec<UserId>,
    by_id: HashMap<UserId, Account>,
    by_email: HashMap<String, UserId>,
}

impl Accounts {
    fn active(&self, id: &UserId) -> Option<&Account> {
        self.by_id.get(id).filter(|account| !account.deleted)
    }

    fn active_mut(&mut self, id: &UserId) -> Option<&mut Account> {
        self.by_id.get_mut(id).filter(|account| !account.deleted)
    }

    /// Refuses to remove `id` from the admin set when it is the last active admin.
    fn ensure_admin_remains(&self, id: &UserId) -> Result<(), DeskError> {
        let is_admin = self
            .active(id)
            .is_some_and(|account| account.user.role == Role::Admin);
        let admins = self
            .by_id
            .values()
            .filter(|account| !account.deleted && account.user.role == Role::Admin)
            .count();
        if is_admin && admins <= 1 {
            return Err(DeskError::invalid_input("at least one administrator must remain"));
        }
        Ok(())
    }
}

/// Account storage with credential verification.
///
/// The email index and the account map live behind one lock so the uniqueness check and the
/// insert can never interleave with another writer. Hashing runs before the lock is taken.
pub struct IdentityStore {
    accounts: RwLock<Accounts>,
    hasher: Arc<dyn CredentialHasher>,
    min_credential_length: usize,
    sequence: AtomicU64,
    decoy: OnceLock<String>,
}

impl IdentityStore {
    pub fn new(hasher: Arc<dyn CredentialHasher>, min_credential_length: usize) -> Self {
        Self {
            accounts: RwLock::new(Accounts::default()),
            hasher,
            min_credential_length: min_credential_length.max(1),
            sequence: AtomicU64::new(1),
            decoy: OnceLock::new(),
        }
    }

    fn next_user_id(&self) -> UserId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        UserId(format!("usr-{id:06}"))
    }

    fn hash(&self, credential: &str) -> Result<String, DeskError> {
        self.hasher
            .hash(credential)
            .map_err(|CredentialError(message)| DeskError::Credential(message))
    }

    fn check_credential_policy(&self, credential: &str) -> Result<(), DeskError> {
        if credential.chars().count() < self.min_credential_length {
            return Err(DeskError::invalid_input(format!(
                "password must be at least {} characters",
                self.min_credential_length
            )));
        }
        Ok(())
    }

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        role: Role,
        initial_credential: &str,
    ) -> Result<User, DeskError> {
        let name = validate_name(name)?;
        let email = validate_email(email)?;
        self.check_credential_policy(initial_credential)?;
        let credential = self.hash(initial_credential)?;

        let mut accounts = self.accounts.write();
        if accounts.by_email.contains_key(&email) {
            return Err(DeskError::DuplicateEmail);
        }

        let user = User {
            id: self.next_user_id(),
            name,
            email: email.clone(),
            role,
            is_first_login: true,
            created_at: Utc::now(),
        };
        accounts.by_email.insert(email, user.id.clone());
        accounts.order.push(user.id.clone());
        accounts.by_id.insert(
            user.id.clone(),
            Account {
                user: user.clone(),
                credential,
                deleted: false,
            },
        );

        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Active accounts in creation order.
    pub fn list_users(&self) -> Vec<User> {
        let accounts = self.accounts.read();
        accounts
            .order
            .iter()
            .filter_map(|id| accounts.active(id))
            .map(|account| account.user.clone())
            .collect()
    }

    pub fn get(&self, id: &UserId) -> Result<User, DeskError> {
        self.accounts
            .read()
            .active(id)
            .map(|account| account.user.clone())
            .ok_or(DeskError::NotFound("user"))
    }

    pub fn update_user(&self, id: &UserId, patch: UserPatch) -> Result<User, DeskError> {
        if patch.is_empty() {
            return Err(DeskError::invalid_input("update must change at least one field"));
        }
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let email = patch.email.as_deref().map(validate_email).transpose()?;

        let mut accounts = self.accounts.write();
        let current_email = accounts
            .active(id)
            .map(|account| account.user.email.clone())
            .ok_or(DeskError::NotFound("user"))?;
        if patch.role.is_some_and(|role| role != Role::Admin) {
            accounts.ensure_admin_remains(id)?;
        }

        if let Some(email) = email.as_ref().filter(|email| **email != current_email) {
            if accounts.by_email.contains_key(email) {
                return Err(DeskError::DuplicateEmail);
            }
            accounts.by_email.remove(&current_email);
            accounts.by_email.insert(email.clone(), id.clone());
        }

        let account = accounts.active_mut(id).ok_or(DeskError::NotFound("user"))?;
        if let Some(name) = name {
            account.user.name = name;
        }
        if let Some(email) = email {
            account.user.email = email;
        }
        if let Some(role) = patch.role {
            account.user.role = role;
        }

        debug!(user_id = %id, "user updated");
        Ok(account.user.clone())
    }

    /// Soft-deletes the account: it disappears from lookups and its email is released, while
    /// application records that reference the id stay valid.
    pub fn delete_user(&self, id: &UserId) -> Result<(), DeskError> {
        let mut accounts = self.accounts.write();
        accounts.ensure_admin_remains(id)?;
        let account = accounts.active_mut(id).ok_or(DeskError::NotFound("user"))?;
        account.deleted = true;
        let email = account.user.email.clone();
        accounts.by_email.remove(&email);

        info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Unknown emails are checked against a decoy hash so both outcomes cost one verify.
    pub fn verify_credential(&self, email: &str, credential: &str) -> Result<User, DeskError> {
        let found = {
            let accounts = self.accounts.read();
            accounts
                .by_email
                .get(&normalize_email(email))
                .and_then(|id| accounts.active(id))
                .map(|account| (account.user.clone(), account.credential.clone()))
        };

        let Some((user, stored)) = found else {
            let decoy = self
                .decoy
                .get_or_init(|| self.hasher.hash(DECOY_CREDENTIAL).unwrap_or_default());
            self.hasher.verify(decoy, credential);
            return Err(DeskError::InvalidCredential);
        };

        if self.hasher.verify(&stored, credential) {
            Ok(user)
        } else {
            Err(DeskError::InvalidCredential)
        }
    }

    /// Replaces the credential and clears the first-login flag.
    ///
    /// A concurrent change between verification and commit is reported as
    /// `InvalidCredential` rather than silently overwritten.
    pub fn change_credential(
        &self,
        id: &UserId,
        old_credential: &str,
        new_credential: &str,
    ) -> Result<User, DeskError> {
        let stored = self
            .accounts
            .read()
            .active(id)
            .map(|account| account.credential.clone())
            .ok_or(DeskError::NotFound("user"))?;

        if !self.hasher.verify(&stored, old_credential) {
            return Err(DeskError::InvalidCredential);
        }
        self.check_credential_policy(new_credential)?;
        let replacement = self.hash(new_credential)?;

        let mut accounts = self.accounts.write();
        let account = accounts.active_mut(id).ok_or(DeskError::NotFound("user"))?;
        if account.credential != stored {
            return Err(DeskError::InvalidCredential);
        }
        account.credential = replacement;
        account.user.is_first_login = false;

        info!(user_id = %id, "credential changed");
        Ok(account.user.clone())
    }

    pub fn summary(&self) -> UserSummary {
        self.list_users()
            .iter()
            .fold(UserSummary::default(), |mut summary, user| {
                summary.total += 1;
                match user.role {
                    Role::Admin => summary.admins += 1,
                    Role::Counselor => summary.counselors += 1,
                    Role::Approver => summary.approvers += 1,
                }
                summary
            })
    }
}

fn validate_name(raw: &str) -> Result<String, DeskError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DeskError::invalid_input("name is required"));
    }
    Ok(name.to_string())
}

fn validate_email(raw: &str) -> Result<String, DeskError> {
    let email = normalize_email(raw);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DeskError::invalid_input("a valid email address is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::PlainHasher;

    fn store() -> IdentityStore {
        IdentityStore::new(Arc::new(PlainHasher::default()), DEFAULT_MIN_CREDENTIAL_LENGTH)
    }

    #[test]
    fn create_user_sets_first_login_and_normalises_email() {
        let store = store();
        let user = store
            .create_user("Jane Smith", " Jane@Example.com ", Role::Counselor, "password")
            .expect("user created");

        assert!(user.is_first_login);
        assert_eq!(user.email, "jane@example.com");
        assert_eq!(user.id.0, "usr-000001");
    }

    #[test]
    fn duplicate_email_leaves_store_unchanged() {
        let store = store();
        store
            .create_user("Jane", "jane@example.com", Role::Counselor, "password")
            .expect("first user");

        let err = store
            .create_user("Other Jane", "JANE@example.com", Role::Approver, "password")
            .expect_err("duplicate rejected");

        assert_eq!(err, DeskError::DuplicateEmail);
        let users = store.list_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Jane");
    }

    #[test]
    fn rejects_invalid_account_fields() {
        let store = store();
        assert!(matches!(
            store.create_user("  ", "a@b.c", Role::Admin, "password"),
            Err(DeskError::InvalidInput(_))
        ));
        assert!(matches!(
            store.create_user("Name", "not-an-email", Role::Admin, "password"),
            Err(DeskError::InvalidInput(_))
        ));
        assert!(matches!(
            store.create_user("Name", "a@b.c", Role::Admin, "short"),
            Err(DeskError::InvalidInput(_))
        ));
        assert!(store.list_users().is_empty());
    }

    #[test]
    fn list_users_preserves_creation_order() {
        let store = store();
        for (name, email) in [("A", "a@x.io"), ("B", "b@x.io"), ("C", "c@x.io")] {
            store
                .create_user(name, email, Role::Counselor, "password")
                .expect("created");
        }

        let names: Vec<_> = store.list_users().into_iter().map(|user| user.name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn update_user_checks_email_uniqueness() {
        let store = store();
        let first = store
            .create_user("A", "a@x.io", Role::Counselor, "password")
            .expect("created");
        store
            .create_user("B", "b@x.io", Role::Counselor, "password")
            .expect("created");

        let err = store
            .update_user(
                &first.id,
                UserPatch {
                    email: Some("b@x.io".to_string()),
                    ..UserPatch::default()
                },
            )
            .expect_err("duplicate");
        assert_eq!(err, DeskError::DuplicateEmail);

        let updated = store
            .update_user(
                &first.id,
                UserPatch {
                    email: Some("a2@x.io".to_string()),
                    role: Some(Role::Approver),
                    ..UserPatch::default()
                },
            )
            .expect("update succeeds");
        assert_eq!(updated.email, "a2@x.io");
        assert_eq!(updated.role, Role::Approver);
        assert!(store.verify_credential("a2@x.io", "password").is_ok());
        assert_eq!(
            store.verify_credential("a@x.io", "password"),
            Err(DeskError::InvalidCredential)
        );
    }

    #[test]
    fn update_missing_user_is_not_found() {
        let store = store();
        let err = store
            .update_user(
                &UserId("usr-999999".to_string()),
                UserPatch {
                    name: Some("Ghost".to_string()),
                    ..UserPatch::default()
                },
            )
            .expect_err("missing");
        assert_eq!(err, DeskError::NotFound("user"));
    }

    #[test]
    fn delete_hides_account_and_releases_email() {
        let store = store();
        let user = store
            .create_user("A", "a@x.io", Role::Counselor, "password")
            .expect("created");

        store.delete_user(&user.id).expect("deleted");
        assert!(store.list_users().is_empty());
        assert_eq!(store.get(&user.id), Err(DeskError::NotFound("user")));
        assert_eq!(store.delete_user(&user.id), Err(DeskError::NotFound("user")));
        assert_eq!(
            store.verify_credential("a@x.io", "password"),
            Err(DeskError::InvalidCredential)
        );

        let replacement = store
            .create_user("A again", "a@x.io", Role::Counselor, "password")
            .expect("email reusable");
        assert_ne!(replacement.id, user.id);
    }

    #[test]
    fn verify_credential_rejects_wrong_secret_and_unknown_email() {
        let store = store();
        store
            .create_user("A", "a@x.io", Role::Counselor, "password")
            .expect("created");

        assert!(store.verify_credential("A@X.IO", "password").is_ok());
        assert_eq!(
            store.verify_credential("a@x.io", "wrong-password"),
            Err(DeskError::InvalidCredential)
        );
        assert_eq!(
            store.verify_credential("nobody@x.io", "password"),
            Err(DeskError::InvalidCredential)
        );
    }

    #[test]
    fn unknown_and_deleted_emails_still_run_one_verification() {
        let hasher = Arc::new(PlainHasher::default());
        let store = IdentityStore::new(hasher.clone(), DEFAULT_MIN_CREDENTIAL_LENGTH);
        let user = store
            .create_user("A", "a@x.io", Role::Counselor, "password")
            .expect("created");

        assert!(store.verify_credential("a@x.io", "wrong-password").is_err());
        assert_eq!(hasher.verifications(), 1);

        assert_eq!(
            store.verify_credential("nobody@x.io", "password"),
            Err(DeskError::InvalidCredential)
        );
        assert_eq!(hasher.verifications(), 2);

        store.delete_user(&user.id).expect("deleted");
        assert_eq!(
            store.verify_credential("a@x.io", "password"),
            Err(DeskError::InvalidCredential)
        );
        assert_eq!(hasher.verifications(), 3);
    }

    #[test]
    fn last_admin_cannot_be_deleted_or_demoted() {
        let store = store();
        let first = store
            .create_user("Root", "root@x.io", Role::Admin, "password")
            .expect("created");
        let demote = || UserPatch {
            role: Some(Role::Counselor),
            ..UserPatch::default()
        };

        assert!(matches!(
            store.delete_user(&first.id),
            Err(DeskError::InvalidInput(_))
        ));
        assert!(matches!(
            store.update_user(&first.id, demote()),
            Err(DeskError::InvalidInput(_))
        ));
        assert_eq!(store.get(&first.id).expect("still active").role, Role::Admin);

        let second = store
            .create_user("Deputy", "deputy@x.io", Role::Admin, "password")
            .expect("created");
        store
            .update_user(&first.id, demote())
            .expect("another admin remains");
        assert!(matches!(
            store.delete_user(&second.id),
            Err(DeskError::InvalidInput(_))
        ));
        assert_eq!(store.summary().admins, 1);
    }

    #[test]
    fn admin_keeping_the_role_can_edit_themselves() {
        let store = store();
        let root = store
            .create_user("Root", "root@x.io", Role::Admin, "password")
            .expect("created");
        let renamed = store
            .update_user(
                &root.id,
                UserPatch {
                    name: Some("Root Admin".to_string()),
                    role: Some(Role::Admin),
                    ..UserPatch::default()
                },
            )
            .expect("role unchanged");
        assert_eq!(renamed.name, "Root Admin");
    }

    #[test]
    fn concurrent_admin_deletions_leave_one_admin() {
        let store = store();
        let admins: Vec<_> = (0..4)
            .map(|n| {
                store
                    .create_user(
                        &format!("Admin {n}"),
                        &format!("admin{n}@x.io"),
                        Role::Admin,
                        "password",
                    )
                    .expect("created")
            })
            .collect();

        std::thread::scope(|scope| {
            for admin in &admins {
                let store = &store;
                scope.spawn(move || {
                    let _ = store.delete_user(&admin.id);
                });
            }
        });

        assert_eq!(store.summary().admins, 1);
    }

    #[test]
    fn decoy_hash_never_matches_its_own_plaintext_account() {
        let store = store();
        assert_eq!(
            store.verify_credential("nobody@x.io", DECOY_CREDENTIAL),
            Err(DeskError::InvalidCredential)
        );
    }

    #[test]
    fn change_credential_clears_first_login() {
        let store = store();
        let user = store
            .create_user("A", "a@x.io", Role::Counselor, "password")
            .expect("created");

        assert_eq!(
            store.change_credential(&user.id, "incorrect", "new-password"),
            Err(DeskError::InvalidCredential)
        );
        assert!(store.get(&user.id).expect("present").is_first_login);

        let changed = store
            .change_credential(&user.id, "password", "new-password")
            .expect("changed");
        assert!(!changed.is_first_login);
        assert!(store.verify_credential("a@x.io", "new-password").is_ok());
        assert!(store.verify_credential("a@x.io", "password").is_err());
    }

    #[test]
    fn change_credential_for_missing_user_is_not_found() {
        let store = store();
        assert_eq!(
            store.change_credential(&UserId("usr-000042".to_string()), "password", "password2"),
            Err(DeskError::NotFound("user"))
        );
    }

    #[test]
    fn summary_counts_active_users_by_role() {
        let store = store();
        store
            .create_user("Admin", "admin@x.io", Role::Admin, "password")
            .expect("created");
        let counselor = store
            .create_user("C", "c@x.io", Role::Counselor, "password")
            .expect("created");
        store
            .create_user("P", "p@x.io", Role::Approver, "password")
            .expect("created");
        store.delete_user(&counselor.id).expect("deleted");

        let summary = store.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.admins, 1);
        assert_eq!(summary.counselors, 0);
        assert_eq!(summary.approvers, 1);
    }

    #[test]
    fn concurrent_creates_with_same_email_admit_exactly_one() {
        let store = store();
        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|n| {
                    let store = &store;
                    scope.spawn(move || {
                        store.create_user(
                            &format!("Racer {n}"),
                            "race@x.io",
                            Role::Counselor,
                            "password",
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread completes"))
                .collect()
        });

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|err| *err == DeskError::DuplicateEmail));
        assert_eq!(store.list_users().len(), 1);
    }
}
