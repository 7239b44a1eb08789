use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

use crate::identity::DEFAULT_MIN_CREDENTIAL_LENGTH;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 480;
/// One year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 366;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// First administrator created at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session lifetime, credential policy, and account bootstrap.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl_minutes: i64,
    pub min_credential_length: usize,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub seed_demo: bool,
    pub demo_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            min_credential_length: DEFAULT_MIN_CREDENTIAL_LENGTH,
            bootstrap_admin: None,
            seed_demo: false,
            demo_password: "password".to_string(),
        }
    }
}

impl AuthConfig {
    /// Session lifetime clamped to `1..=MAX_SESSION_TTL_MINUTES` minutes.
    pub fn session_ttl(&self) -> Duration {
        let minutes = self.session_ttl_minutes.clamp(1, MAX_SESSION_TTL_MINUTES);
        Duration::try_minutes(minutes)
            .unwrap_or_else(|| Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let session_ttl_minutes = match env::var("FINAID_SESSION_TTL_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|minutes| (1..=MAX_SESSION_TTL_MINUTES).contains(minutes))
                .ok_or(ConfigError::InvalidSessionTtl)?,
            Err(_) => defaults.session_ttl_minutes,
        };

        let min_credential_length = match env::var("FINAID_MIN_CREDENTIAL_LENGTH") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|length| *length > 0)
                .ok_or(ConfigError::InvalidCredentialLength)?,
            Err(_) => defaults.min_credential_length,
        };

        let bootstrap_admin = match (
            env::var("FINAID_BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("FINAID_BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteBootstrapAdmin),
        };

        let seed_demo = match env::var("FINAID_SEED_DEMO") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                key: "FINAID_SEED_DEMO",
            })?,
            Err(_) => defaults.seed_demo,
        };

        let demo_password = env::var("FINAID_DEMO_PASSWORD").unwrap_or(defaults.demo_password);

        Ok(Self {
            session_ttl_minutes,
            min_credential_length,
            bootstrap_admin,
            seed_demo,
            demo_password,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("FINAID_SESSION_TTL_MINUTES must be between 1 and 527040 (one year)")]
    InvalidSessionTtl,
    #[error("FINAID_MIN_CREDENTIAL_LENGTH must be a positive integer")]
    InvalidCredentialLength,
    #[error(
        "FINAID_BOOTSTRAP_ADMIN_EMAIL and FINAID_BOOTSTRAP_ADMIN_PASSWORD must be set together"
    )]
    IncompleteBootstrapAdmin,
    #[error("{key} must be true or false")]
    InvalidFlag { key: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "FINAID_SESSION_TTL_MINUTES",
            "FINAID_MIN_CREDENTIAL_LENGTH",
            "FINAID_BOOTSTRAP_ADMIN_EMAIL",
            "FINAID_BOOTSTRAP_ADMIN_PASSWORD",
            "FINAID_SEED_DEMO",
            "FINAID_DEMO_PASSWORD",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.auth.session_ttl_minutes, 480);
        assert_eq!(config.auth.min_credential_length, 8);
        assert!(config.auth.bootstrap_admin.is_none());
        assert!(!config.auth.seed_demo);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_auth_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FINAID_SESSION_TTL_MINUTES", "30");
        env::set_var("FINAID_MIN_CREDENTIAL_LENGTH", "12");
        env::set_var("FINAID_BOOTSTRAP_ADMIN_EMAIL", "root@example.com");
        env::set_var("FINAID_BOOTSTRAP_ADMIN_PASSWORD", "bootstrap-secret");
        env::set_var("FINAID_SEED_DEMO", "yes");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.auth.session_ttl_minutes, 30);
        assert_eq!(config.auth.min_credential_length, 12);
        assert!(config.auth.seed_demo);
        let admin = config.auth.bootstrap_admin.expect("bootstrap admin");
        assert_eq!(admin.email, "root@example.com");
        assert!(!format!("{admin:?}").contains("bootstrap-secret"));
        reset_env();
    }

    #[test]
    fn rejects_half_configured_bootstrap_admin() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FINAID_BOOTSTRAP_ADMIN_EMAIL", "root@example.com");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::IncompleteBootstrapAdmin)
        ));
        reset_env();
    }

    #[test]
    fn rejects_session_ttl_beyond_a_year() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        for raw in ["527041", "1000000000000", "9223372036854775807"] {
            env::set_var("FINAID_SESSION_TTL_MINUTES", raw);
            assert!(matches!(
                AppConfig::load(),
                Err(ConfigError::InvalidSessionTtl)
            ));
        }
        env::set_var("FINAID_SESSION_TTL_MINUTES", "527040");
        let config = AppConfig::load().expect("upper bound accepted");
        assert_eq!(config.auth.session_ttl(), Duration::days(366));
        reset_env();
    }

    #[test]
    fn session_ttl_is_clamped_for_hand_built_configs() {
        let huge = AuthConfig {
            session_ttl_minutes: i64::MAX,
            ..AuthConfig::default()
        };
        assert_eq!(huge.session_ttl(), Duration::days(366));

        let negative = AuthConfig {
            session_ttl_minutes: -5,
            ..AuthConfig::default()
        };
        assert_eq!(negative.session_ttl(), Duration::minutes(1));
    }

    #[test]
    fn rejects_non_positive_session_ttl() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FINAID_SESSION_TTL_MINUTES", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidSessionTtl)
        ));
        reset_env();
    }
}
