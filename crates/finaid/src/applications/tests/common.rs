use std::sync::Arc;

use chrono::Utc;

use crate::applications::{Application, ApplicationRegistry, WorkflowEngine};
use crate::identity::{Role, User, UserId};

pub(super) fn user(id: &str, role: Role) -> User {
    User {
        id: UserId(id.to_string()),
        name: format!("{} {id}", role.label()),
        email: format!("{id}@example.com"),
        role,
        is_first_login: false,
        created_at: Utc::now(),
    }
}

pub(super) fn counselor(id: &str) -> User {
    user(id, Role::Counselor)
}

pub(super) fn approver(id: &str) -> User {
    user(id, Role::Approver)
}

pub(super) fn admin(id: &str) -> User {
    user(id, Role::Admin)
}

pub(super) fn engine() -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(ApplicationRegistry::new()))
}

pub(super) fn tuition(engine: &WorkflowEngine, owner: &User) -> Application {
    engine
        .registry()
        .create(owner, "Student One", 5000.0, "Tuition")
        .expect("counselor can submit")
}

/// Structural invariant: a decision exists exactly when the status is terminal, and agrees
/// with it.
pub(super) fn assert_decision_consistent(application: &Application) {
    match application.decision() {
        Some(decision) => {
            assert!(application.status().is_terminal());
            assert_eq!(decision.decision.status(), application.status());
        }
        None => assert!(!application.status().is_terminal()),
    }
    assert!(application.updated_at >= application.created_at);
}
