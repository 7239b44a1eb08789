use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::identity::UserId;

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status. Derived from [`Review`], never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome an approver may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub const fn status(self) -> ApplicationStatus {
        match self {
            Verdict::Approved => ApplicationStatus::Approved,
            Verdict::Rejected => ApplicationStatus::Rejected,
        }
    }

    pub const fn label(self) -> &'static str {
        self.status().label()
    }
}

/// Decision value other than `approved` or `rejected`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown decision '{0}'")]
pub struct UnknownVerdict(pub String);

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Verdict::Approved),
            "rejected" => Ok(Verdict::Rejected),
            _ => Err(UnknownVerdict(value.trim().to_string())),
        }
    }
}

/// Recorded review outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub approved_by: UserId,
    pub decision: Verdict,
    pub reason: String,
    pub decision_date: DateTime<Utc>,
}

/// Review state. A decision exists exactly when the application has left `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum Review {
    Pending,
    Decided(Decision),
}

impl Review {
    pub fn status(&self) -> ApplicationStatus {
        match self {
            Review::Pending => ApplicationStatus::Pending,
            Review::Decided(decision) => decision.decision.status(),
        }
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Review::Pending => None,
            Review::Decided(decision) => Some(decision),
        }
    }
}

/// Financial-aid application as held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub id: ApplicationId,
    pub student_name: String,
    pub amount: f64,
    pub purpose: String,
    pub review: Review,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn status(&self) -> ApplicationStatus {
        self.review.status()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.review.decision()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.review, Review::Pending)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationWire<'a> {
    id: &'a ApplicationId,
    student_name: &'a str,
    amount: f64,
    purpose: &'a str,
    status: ApplicationStatus,
    created_by: &'a UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a Decision>,
}

impl Serialize for Application {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ApplicationWire {
            id: &self.id,
            student_name: &self.student_name,
            amount: self.amount,
            purpose: &self.purpose,
            status: self.status(),
            created_by: &self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            decision: self.decision(),
        }
        .serialize(serializer)
    }
}

/// Counselor-editable fields. Status and decision are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationPatch {
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl ApplicationPatch {
    pub fn is_empty(&self) -> bool {
        self.student_name.is_none() && self.amount.is_none() && self.purpose.is_none()
    }
}

/// Listing filters used by the counselor list and the approver queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Reviewed,
}

impl StatusFilter {
    pub fn admits(self, status: ApplicationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status == ApplicationStatus::Pending,
            StatusFilter::Reviewed => status.is_terminal(),
        }
    }
}

/// Dashboard counts over the applications visible to a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total_requested: f64,
    pub approval_rate: Option<f64>,
}
