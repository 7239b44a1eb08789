//! Fixed role policy gating every mutation and read.
//!
//! Everything here is pure: no I/O, no clock, no shared state.

use std::fmt;

use crate::applications::Application;
use crate::desk::DeskError;
use crate::identity::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ManageUsers,
    CreateApplication,
    EditOwnApplication,
    ViewApplications,
    ReviewApplication,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::ManageUsers => "users.manage",
            Action::CreateApplication => "applications.create",
            Action::EditOwnApplication => "applications.edit_own",
            Action::ViewApplications => "applications.view",
            Action::ReviewApplication => "applications.review",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role column of the policy table, ignoring resource constraints.
pub const fn role_permits(role: Role, action: Action) -> bool {
    match (role, action) {
        (Role::Admin, Action::ManageUsers) => true,
        (Role::Counselor, Action::CreateApplication) => true,
        (Role::Counselor, Action::EditOwnApplication) => true,
        (Role::Counselor | Role::Approver | Role::Admin, Action::ViewApplications) => true,
        (Role::Approver, Action::ReviewApplication) => true,
        (Role::Admin, _) | (Role::Counselor, _) | (Role::Approver, _) => false,
    }
}

/// Whether `principal` may see `application` at all.
pub fn can_view(principal: &User, application: &Application) -> bool {
    match principal.role {
        Role::Counselor => application.created_by == principal.id,
        Role::Approver | Role::Admin => true,
    }
}

/// Full policy decision. Resource-constrained actions are denied without a resource.
pub fn can(principal: &User, action: Action, resource: Option<&Application>) -> bool {
    if !role_permits(principal.role, action) {
        return false;
    }

    match action {
        Action::ManageUsers | Action::CreateApplication => true,
        Action::ViewApplications => resource.map_or(true, |app| can_view(principal, app)),
        Action::EditOwnApplication => resource
            .is_some_and(|app| app.created_by == principal.id && app.is_pending()),
        Action::ReviewApplication => resource.is_some_and(Application::is_pending),
    }
}

/// `?`-friendly variant of [`can`] for the transport boundary.
pub fn require(
    principal: &User,
    action: Action,
    resource: Option<&Application>,
) -> Result<(), DeskError> {
    if can(principal, action, resource) {
        Ok(())
    } else {
        Err(DeskError::Forbidden)
    }
}
