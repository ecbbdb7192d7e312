//! Environment-driven selection of queue and credential adapters shared by both binaries.

use std::sync::Arc;

use sqlx::PgPool;
use tagsync_application::{TagUpdateQueue, TokenSource};
use tagsync_core::{AppError, AppResult};
use tracing::info;
use url::Url;

use crate::azure_resource_manager_client::AzureResourceManagerClient;
use crate::azure_token_source::{
    ManagedIdentityEndpoint, ManagedIdentityTokenSource, ServicePrincipalTokenSource,
};
use crate::postgres_tag_update_queue::PostgresTagUpdateQueue;
use crate::redis_tag_update_queue::RedisTagUpdateQueue;

/// Queue name used when none is configured.
pub const DEFAULT_TAG_QUEUE_NAME: &str = "resources-to-tag";

const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_RETRY_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Queue transport selected by `TAG_QUEUE_BACKEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagQueueSettings {
    /// Rows in the `tag_update_jobs` table.
    Postgres {
        /// Logical queue name.
        queue_name: String,
    },
    /// Redis lists.
    Redis {
        /// Connection URL.
        redis_url: String,
        /// Key prefix.
        queue_name: String,
    },
}

impl TagQueueSettings {
    /// Reads queue settings through the provided variable lookup.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let queue_name = non_empty(lookup, "TAG_QUEUE_NAME")
            .unwrap_or_else(|| DEFAULT_TAG_QUEUE_NAME.to_owned());

        match non_empty(lookup, "TAG_QUEUE_BACKEND")
            .unwrap_or_else(|| "postgres".to_owned())
            .as_str()
        {
            "postgres" => Ok(Self::Postgres { queue_name }),
            "redis" => Ok(Self::Redis {
                redis_url: non_empty(lookup, "REDIS_URL").ok_or_else(|| {
                    AppError::Validation(
                        "REDIS_URL is required when TAG_QUEUE_BACKEND=redis".to_owned(),
                    )
                })?,
                queue_name,
            }),
            other => Err(AppError::Validation(format!(
                "TAG_QUEUE_BACKEND must be either 'postgres' or 'redis', got '{other}'"
            ))),
        }
    }

    /// Builds the configured queue adapter.
    pub fn build(&self, pool: PgPool) -> AppResult<Arc<dyn TagUpdateQueue>> {
        match self {
            Self::Postgres { queue_name } => {
                info!(queue_name = %queue_name, "using postgres tag update queue");
                Ok(Arc::new(PostgresTagUpdateQueue::new(pool, queue_name.clone())))
            }
            Self::Redis {
                redis_url,
                queue_name,
            } => {
                let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                    AppError::Validation(format!("invalid REDIS_URL: {error}"))
                })?;
                info!(queue_name = %queue_name, "using redis tag update queue");
                Ok(Arc::new(RedisTagUpdateQueue::new(client, queue_name.clone())))
            }
        }
    }
}

/// Identity used for management API calls.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSettings {
    /// Registered application with a client secret.
    ServicePrincipal {
        /// Directory tenant.
        tenant_id: String,
        /// Application id.
        client_id: String,
        /// Application secret.
        client_secret: String,
        /// Token authority.
        authority_host: Url,
    },
    /// Platform-assigned or user-assigned managed identity.
    ManagedIdentity {
        /// Token endpoint flavor.
        endpoint: ManagedIdentityEndpoint,
        /// User-assigned identity client id.
        client_id: Option<String>,
    },
}

/// Management API connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagementSettings {
    /// Management API base URL.
    pub endpoint: Url,
    /// Identity used to call it.
    pub credential: CredentialSettings,
    /// Attempts per call for throttled or failing responses.
    pub retry_max_attempts: u8,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl ManagementSettings {
    /// Reads endpoint and credential settings through the provided variable lookup.
    ///
    /// Without `AZURE_CREDENTIAL_MODE`, managed identity is chosen when an
    /// identity endpoint variable is present.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let endpoint = parse_url(
            "ARM_ENDPOINT",
            non_empty(lookup, "ARM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_owned())
                .as_str(),
        )?;

        let identity_endpoint =
            non_empty(lookup, "IDENTITY_ENDPOINT").or_else(|| non_empty(lookup, "MSI_ENDPOINT"));
        let mode = match non_empty(lookup, "AZURE_CREDENTIAL_MODE") {
            Some(mode) => mode,
            None if identity_endpoint.is_some() => "managed_identity".to_owned(),
            None => "service_principal".to_owned(),
        };

        let credential = match mode.as_str() {
            "service_principal" => CredentialSettings::ServicePrincipal {
                tenant_id: required(lookup, "AZURE_TENANT_ID")?,
                client_id: required(lookup, "AZURE_CLIENT_ID")?,
                client_secret: required(lookup, "AZURE_CLIENT_SECRET")?,
                authority_host: parse_url(
                    "AZURE_AUTHORITY_HOST",
                    non_empty(lookup, "AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_owned())
                        .as_str(),
                )?,
            },
            "managed_identity" => {
                let endpoint = match identity_endpoint {
                    Some(identity_endpoint) => ManagedIdentityEndpoint::AppService {
                        endpoint: parse_url("IDENTITY_ENDPOINT", identity_endpoint.as_str())?,
                        header: non_empty(lookup, "IDENTITY_HEADER")
                            .or_else(|| non_empty(lookup, "MSI_SECRET"))
                            .ok_or_else(|| {
                                AppError::Validation(
                                    "IDENTITY_HEADER is required with IDENTITY_ENDPOINT"
                                        .to_owned(),
                                )
                            })?,
                    },
                    None => ManagedIdentityEndpoint::InstanceMetadata,
                };
                CredentialSettings::ManagedIdentity {
                    endpoint,
                    client_id: non_empty(lookup, "AZURE_CLIENT_ID"),
                }
            }
            other => {
                return Err(AppError::Validation(format!(
                    "AZURE_CREDENTIAL_MODE must be 'service_principal' or 'managed_identity', got '{other}'"
                )));
            }
        };

        let retry_max_attempts = match non_empty(lookup, "ARM_RETRY_MAX_ATTEMPTS") {
            Some(value) => value.parse::<u8>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid ARM_RETRY_MAX_ATTEMPTS value '{value}': {error}"
                ))
            })?,
            None => DEFAULT_RETRY_MAX_ATTEMPTS,
        };
        let retry_backoff_ms = match non_empty(lookup, "ARM_RETRY_BACKOFF_MS") {
            Some(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid ARM_RETRY_BACKOFF_MS value '{value}': {error}"
                ))
            })?,
            None => DEFAULT_RETRY_BACKOFF_MS,
        };

        Ok(Self {
            endpoint,
            credential,
            retry_max_attempts,
            retry_backoff_ms,
        })
    }

    /// Builds the management API client together with its token source.
    pub fn resource_graph(&self, http_client: reqwest::Client) -> AppResult<AzureResourceManagerClient> {
        let token_source = self.token_source(http_client.clone())?;
        Ok(
            AzureResourceManagerClient::new(http_client, self.endpoint.clone(), token_source)
                .with_retry(self.retry_max_attempts, self.retry_backoff_ms),
        )
    }

    /// Builds the token source for the configured identity.
    pub fn token_source(&self, http_client: reqwest::Client) -> AppResult<Arc<dyn TokenSource>> {
        match &self.credential {
            CredentialSettings::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => {
                info!(tenant_id = %tenant_id, "using service principal credential");
                Ok(Arc::new(ServicePrincipalTokenSource::new(
                    http_client,
                    authority_host,
                    tenant_id.as_str(),
                    client_id.clone(),
                    client_secret.clone(),
                    &self.endpoint,
                )?))
            }
            CredentialSettings::ManagedIdentity {
                endpoint,
                client_id,
            } => {
                info!("using managed identity credential");
                Ok(Arc::new(ManagedIdentityTokenSource::new(
                    http_client,
                    endpoint.clone(),
                    client_id.clone(),
                    &self.endpoint,
                )))
            }
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    non_empty(lookup, name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_url(name: &str, value: &str) -> AppResult<Url> {
    Url::parse(value).map_err(|error| AppError::Validation(format!("invalid {name} '{value}': {error}")))
}
