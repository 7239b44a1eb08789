use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::domain::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, ApplicationSummary, Review,
    StatusFilter,
};
use crate::authz::{self, Action};
use crate::desk::DeskError;
use crate::identity::User;

type RecordHandle = Arc<Mutex<Application>>;

#[derive(Default)]
struct Arena {
    slots: Vec<RecordHandle>,
    index: HashMap<ApplicationId, usize>,
}

/// Owns every application record.
///
/// Records live in an append-only arena and each one carries its own lock. The arena lock is
/// only held long enough to clone a record handle, so work on different ids never contends.
#[derive(Default)]
pub struct ApplicationRegistry {
    arena: RwLock<Arena>,
    sequence: AtomicU64,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_application_id(&self) -> ApplicationId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        ApplicationId(format!("app-{id:06}"))
    }

    fn handle(&self, id: &ApplicationId) -> Option<RecordHandle> {
        let arena = self.arena.read();
        arena.index.get(id).map(|slot| arena.slots[*slot].clone())
    }

    fn snapshot_handles(&self) -> Vec<RecordHandle> {
        self.arena.read().slots.clone()
    }

    /// Runs `apply` against the locked record after the visibility check.
    ///
    /// `apply` receives a draft copy and the commit timestamp that becomes `updated_at`; the
    /// draft replaces the stored record only when `apply` succeeds, so failures never leave a
    /// partial mutation behind.
    pub(crate) fn mutate<F>(
        &self,
        principal: &User,
        id: &ApplicationId,
        apply: F,
    ) -> Result<Application, DeskError>
    where
        F: FnOnce(&mut Application, DateTime<Utc>) -> Result<(), DeskError>,
    {
        let handle = self.handle(id).ok_or(DeskError::NotFound("application"))?;
        let mut record = handle.lock();
        if !authz::can_view(principal, &record) {
            return Err(DeskError::NotFound("application"));
        }

        let committed_at = bump(record.updated_at);
        let mut draft = record.clone();
        apply(&mut draft, committed_at)?;
        draft.updated_at = committed_at;
        *record = draft;
        Ok(record.clone())
    }

    pub fn create(
        &self,
        principal: &User,
        student_name: &str,
        amount: f64,
        purpose: &str,
    ) -> Result<Application, DeskError> {
        authz::require(principal, Action::CreateApplication, None)?;
        let student_name = required_text(student_name, "student name")?;
        let purpose = required_text(purpose, "purpose")?;
        let amount = positive_amount(amount)?;

        let now = Utc::now();
        let application = Application {
            id: self.next_application_id(),
            student_name,
            amount,
            purpose,
            review: Review::Pending,
            created_by: principal.id.clone(),
            created_at: now,
            updated_at: now,
        };

        {
            let mut arena = self.arena.write();
            let slot = arena.slots.len();
            arena.slots.push(Arc::new(Mutex::new(application.clone())));
            arena.index.insert(application.id.clone(), slot);
        }

        info!(
            application_id = %application.id,
            counselor = %principal.id,
            amount = application.amount,
            "application submitted"
        );
        Ok(application)
    }

    pub fn get(&self, principal: &User, id: &ApplicationId) -> Result<Application, DeskError> {
        let handle = self.handle(id).ok_or(DeskError::NotFound("application"))?;
        let record = handle.lock();
        if !authz::can_view(principal, &record) {
            return Err(DeskError::NotFound("application"));
        }
        authz::require(principal, Action::ViewApplications, Some(&*record))?;
        Ok(record.clone())
    }

    /// Visible applications matching `filter`, in creation order.
    pub fn list_filtered(
        &self,
        principal: &User,
        filter: StatusFilter,
    ) -> Result<Vec<Application>, DeskError> {
        authz::require(principal, Action::ViewApplications, None)?;
        Ok(self
            .snapshot_handles()
            .into_iter()
            .filter_map(|handle| {
                let record = handle.lock();
                if authz::can_view(principal, &record) && filter.admits(record.status()) {
                    Some(record.clone())
                } else {
                    None
                }
            })
            .collect())
    }

    /// Edits a pending application owned by the calling counselor.
    pub fn update(
        &self,
        principal: &User,
        id: &ApplicationId,
        patch: ApplicationPatch,
    ) -> Result<Application, DeskError> {
        let updated = self.mutate(principal, id, |draft, _| {
            if !authz::role_permits(principal.role, Action::EditOwnApplication) {
                return Err(DeskError::Forbidden);
            }
            if draft.created_by != principal.id {
                return Err(DeskError::NotFound("application"));
            }
            if !draft.is_pending() {
                return Err(DeskError::InvalidState);
            }
            debug_assert!(authz::can(
                principal,
                Action::EditOwnApplication,
                Some(&*draft)
            ));
            apply_patch(draft, patch)
        })?;

        debug!(application_id = %updated.id, "application updated");
        Ok(updated)
    }

    pub fn summary(&self, principal: &User) -> Result<ApplicationSummary, DeskError> {
        let visible = self.list_filtered(principal, StatusFilter::All)?;
        let mut summary = visible.iter().fold(
            ApplicationSummary::default(),
            |mut summary, application| {
                summary.total += 1;
                summary.total_requested += application.amount;
                match application.status() {
                    ApplicationStatus::Pending => summary.pending += 1,
                    ApplicationStatus::Approved => summary.approved += 1,
                    ApplicationStatus::Rejected => summary.rejected += 1,
                }
                summary
            },
        );

        let reviewed = summary.approved + summary.rejected;
        if reviewed > 0 {
            summary.approval_rate = Some(summary.approved as f64 / reviewed as f64);
        }
        Ok(summary)
    }
}

fn apply_patch(draft: &mut Application, patch: ApplicationPatch) -> Result<(), DeskError> {
    if patch.is_empty() {
        return Err(DeskError::invalid_input("update must change at least one field"));
    }

    let ApplicationPatch {
        student_name,
        amount,
        purpose,
    } = patch;

    if let Some(student_name) = student_name {
        draft.student_name = required_text(&student_name, "student name")?;
    }
    if let Some(amount) = amount {
        draft.amount = positive_amount(amount)?;
    }
    if let Some(purpose) = purpose {
        draft.purpose = required_text(&purpose, "purpose")?;
    }
    Ok(())
}

/// Next `updatedAt`, never earlier than the previous one even if the wall clock steps back.
pub(crate) fn bump(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

pub(crate) fn required_text(raw: &str, field: &str) -> Result<String, DeskError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DeskError::invalid_input(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn positive_amount(amount: f64) -> Result<f64, DeskError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(DeskError::InvalidAmount)
    }
}
