use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tagsync_application::VersionLookupFailurePolicy;
use tagsync_core::AppError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct AuditorConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub audit_interval: Duration,
    pub run_on_start: bool,
    pub auditor_host: String,
    pub auditor_port: u16,
    pub trigger_token: Option<String>,
    pub version_failure_policy: VersionLookupFailurePolicy,
}

impl AuditorConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_env("DATABASE_URL")?;

        let interval_seconds = match env::var("AUDIT_INTERVAL_SECONDS") {
            Ok(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid AUDIT_INTERVAL_SECONDS value '{value}': {error}"
                ))
            })?,
            Err(_) => 3600,
        };
        if interval_seconds == 0 {
            return Err(AppError::Validation(
                "AUDIT_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let run_on_start = env::var("AUDIT_RUN_ON_START")
            .unwrap_or_else(|_| "true".to_owned())
            .eq_ignore_ascii_case("true");

        let auditor_host = env::var("AUDITOR_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let auditor_port = env::var("AUDITOR_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3002);

        let trigger_token = env::var("AUDITOR_TRIGGER_TOKEN")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let version_failure_policy = match env::var("VERSION_LOOKUP_FAILURE_POLICY") {
            Ok(value) => VersionLookupFailurePolicy::parse(value.trim())?,
            Err(_) => VersionLookupFailurePolicy::default(),
        };

        Ok(Self {
            migrate_only,
            database_url,
            audit_interval: Duration::from_secs(interval_seconds),
            run_on_start,
            auditor_host,
            auditor_port,
            trigger_token,
            version_failure_policy,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.auditor_host).map_err(|error| {
            AppError::Internal(format!(
                "invalid AUDITOR_HOST '{}': {error}",
                self.auditor_host
            ))
        })?;
        Ok(SocketAddr::from((host, self.auditor_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
