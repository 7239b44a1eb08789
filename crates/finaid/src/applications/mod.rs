//! Application records, their lifecycle, and the review workflow.

pub mod domain;
pub mod registry;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, ApplicationSummary,
    Decision, Review, StatusFilter, UnknownVerdict, Verdict,
};
pub use registry::ApplicationRegistry;
pub use workflow::WorkflowEngine;
