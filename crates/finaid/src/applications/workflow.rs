use std::sync::Arc;

use tracing::info;

use super::domain::{Application, ApplicationId, Decision, Review, UnknownVerdict, Verdict};
use super::registry::{required_text, ApplicationRegistry};
use crate::authz::{self, Action};
use crate::desk::DeskError;
use crate::identity::User;

/// Drives the one-way `pending -> approved | rejected` transition.
///
/// `review` is the only code path that attaches a decision; the registry's update refuses to
/// touch review state.
pub struct WorkflowEngine {
    registry: Arc<ApplicationRegistry>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<ApplicationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ApplicationRegistry {
        &self.registry
    }

    /// Records an approver's decision.
    ///
    /// Runs under the record lock: of several concurrent reviewers exactly one sees a pending
    /// application, the rest get `AlreadyReviewed`.
    pub fn review(
        &self,
        principal: &User,
        id: &ApplicationId,
        verdict: Verdict,
        reason: &str,
    ) -> Result<Application, DeskError> {
        let reviewed = self.registry.mutate(principal, id, |draft, committed_at| {
            if !authz::role_permits(principal.role, Action::ReviewApplication) {
                return Err(DeskError::Forbidden);
            }
            if !draft.is_pending() {
                return Err(DeskError::AlreadyReviewed);
            }
            let reason = required_text(reason, "reason")?;
            debug_assert!(authz::can(
                principal,
                Action::ReviewApplication,
                Some(&*draft)
            ));

            draft.review = Review::Decided(Decision {
                approved_by: principal.id.clone(),
                decision: verdict,
                reason,
                decision_date: committed_at,
            });
            Ok(())
        })?;

        info!(
            application_id = %reviewed.id,
            reviewer = %principal.id,
            decision = verdict.label(),
            "application reviewed"
        );
        Ok(reviewed)
    }
}

impl Verdict {
    /// Parses the wire value of a review decision.
    pub fn parse(raw: &str) -> Result<Self, DeskError> {
        raw.parse().map_err(|err: UnknownVerdict| {
            DeskError::invalid_input(format!("{err}: expected 'approved' or 'rejected'"))
        })
    }
}
