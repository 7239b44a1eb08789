//! Role-gated workflow core for financial-aid applications.
//!
//! Counselors submit applications, approvers decide them once, administrators manage
//! accounts. [`desk::AidDesk`] owns all state; [`router::api_router`] exposes it over HTTP.

pub mod applications;
pub mod authz;
pub mod config;
pub mod desk;
pub mod error;
pub mod identity;
pub mod router;
pub mod telemetry;

pub use desk::{AidDesk, DeskError};
