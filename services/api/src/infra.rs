use finaid::config::AuthConfig;
use finaid::error::AppError;
use finaid::AidDesk;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Builds the desk and provisions the configured startup accounts.
pub(crate) fn provision_desk(config: &AuthConfig, seed_demo: bool) -> Result<AidDesk, AppError> {
    let desk = AidDesk::from_config(config);

    if let Some(admin) = &config.bootstrap_admin {
        desk.bootstrap_admin(&admin.email, &admin.password)?;
    }
    if seed_demo || config.seed_demo {
        let seeded = desk.seed_demo(&config.demo_password)?;
        info!(accounts = seeded.len(), "demo accounts available");
    }
    if desk.identity().summary().admins == 0 {
        warn!("no administrator provisioned; user management is unreachable");
    }

    Ok(desk)
}
