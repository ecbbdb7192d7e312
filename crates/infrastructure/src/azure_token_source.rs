//! Identity provider adapters issuing management API tokens.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tagsync_application::TokenSource;
use tagsync_core::{AccessToken, AppError, AppResult};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Reuses a token until it is this close to expiry.
const REFRESH_MARGIN_SECONDS: i64 = 300;

#[derive(Debug, Default)]
struct TokenCache {
    current: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    async fn fresh(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| !token.expires_within(Duration::seconds(REFRESH_MARGIN_SECONDS), now))
            .cloned()
    }

    async fn store(&self, token: AccessToken) {
        *self.current.write().await = Some(token);
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<Value>,
    expires_on: Option<Value>,
}

impl TokenResponse {
    fn into_access_token(self, now: DateTime<Utc>) -> AppResult<AccessToken> {
        let expires_at = if let Some(expires_on) = self.expires_on.as_ref().and_then(seconds_value)
        {
            DateTime::<Utc>::from_timestamp(expires_on, 0).ok_or_else(|| {
                AppError::Unauthorized(format!("token expiry '{expires_on}' is out of range"))
            })?
        } else if let Some(expires_in) = self.expires_in.as_ref().and_then(seconds_value) {
            now + Duration::seconds(expires_in)
        } else {
            return Err(AppError::Unauthorized(
                "token response carries no expiry".to_owned(),
            ));
        };

        Ok(AccessToken::new(self.access_token, expires_at))
    }
}

/// Identity endpoints return lifetimes either as numbers or numeric strings.
fn seconds_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

async fn decode_token_response(
    response: reqwest::Response,
    now: DateTime<Utc>,
) -> AppResult<AccessToken> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| AppError::Unauthorized(format!("failed to read token response: {error}")))?;

    if !status.is_success() {
        return Err(AppError::Unauthorized(format!(
            "identity provider returned status {status}: {body}"
        )));
    }

    let parsed: TokenResponse = serde_json::from_str(body.as_str())
        .map_err(|error| AppError::Unauthorized(format!("invalid token response: {error}")))?;
    parsed.into_access_token(now)
}

/// Returns the OAuth scope for a management endpoint.
#[must_use]
pub fn management_scope(endpoint: &Url) -> String {
    format!("{}/.default", endpoint.as_str().trim_end_matches('/'))
}

/// Client-credential token source for a registered application.
pub struct ServicePrincipalTokenSource {
    http_client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
    cache: TokenCache,
}

impl ServicePrincipalTokenSource {
    /// Creates a token source for one tenant and application.
    pub fn new(
        http_client: reqwest::Client,
        authority_host: &Url,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        management_endpoint: &Url,
    ) -> AppResult<Self> {
        if tenant_id.trim().is_empty() {
            return Err(AppError::Validation(
                "service principal tenant id must not be empty".to_owned(),
            ));
        }

        let token_url = authority_host
            .join(format!("{}/oauth2/v2.0/token", tenant_id.trim()).as_str())
            .map_err(|error| {
                AppError::Validation(format!("invalid identity authority host: {error}"))
            })?;

        Ok(Self {
            http_client,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: management_scope(management_endpoint),
            cache: TokenCache::default(),
        })
    }
}

#[async_trait]
impl TokenSource for ServicePrincipalTokenSource {
    async fn access_token(&self) -> AppResult<AccessToken> {
        let now = Utc::now();
        if let Some(token) = self.cache.fresh(now).await {
            return Ok(token);
        }

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|error| {
                AppError::Unauthorized(format!("failed to request service principal token: {error}"))
            })?;

        let token = decode_token_response(response, now).await?;
        debug!(expires_at = %token.expires_at(), "service principal token refreshed");
        self.cache.store(token.clone()).await;
        Ok(token)
    }
}

/// Where a managed identity token is requested from.
#[derive(Clone, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
    /// App Service style endpoint protected by a shared header secret.
    AppService {
        /// Value of `IDENTITY_ENDPOINT`.
        endpoint: Url,
        /// Value of `IDENTITY_HEADER`.
        header: String,
    },
    /// Instance metadata service reachable from virtual machines.
    InstanceMetadata,
}

/// Managed identity token source.
pub struct ManagedIdentityTokenSource {
    http_client: reqwest::Client,
    endpoint: ManagedIdentityEndpoint,
    client_id: Option<String>,
    resource: String,
    cache: TokenCache,
}

impl ManagedIdentityTokenSource {
    /// Creates a token source; `client_id` selects a user-assigned identity.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: ManagedIdentityEndpoint,
        client_id: Option<String>,
        management_endpoint: &Url,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            client_id,
            resource: management_endpoint.as_str().trim_end_matches('/').to_owned(),
            cache: TokenCache::default(),
        }
    }

    fn token_request_url(&self) -> AppResult<Url> {
        let (mut url, api_version) = match &self.endpoint {
            ManagedIdentityEndpoint::AppService { endpoint, .. } => {
                (endpoint.clone(), APP_SERVICE_API_VERSION)
            }
            ManagedIdentityEndpoint::InstanceMetadata => (
                Url::parse(IMDS_TOKEN_ENDPOINT).map_err(|error| {
                    AppError::Internal(format!("invalid metadata endpoint: {error}"))
                })?,
                IMDS_API_VERSION,
            ),
        };

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", api_version)
                .append_pair("resource", self.resource.as_str());
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id.as_str());
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityTokenSource {
    async fn access_token(&self) -> AppResult<AccessToken> {
        let now = Utc::now();
        if let Some(token) = self.cache.fresh(now).await {
            return Ok(token);
        }

        let request = self.http_client.get(self.token_request_url()?);
        let request = match &self.endpoint {
            ManagedIdentityEndpoint::AppService { header, .. } => {
                request.header("X-IDENTITY-HEADER", header.as_str())
            }
            ManagedIdentityEndpoint::InstanceMetadata => request.header("Metadata", "true"),
        };

        let response = request.send().await.map_err(|error| {
            AppError::Unauthorized(format!("failed to request managed identity token: {error}"))
        })?;

        let token = decode_token_response(response, now).await?;
        debug!(expires_at = %token.expires_at(), "managed identity token refreshed");
        self.cache.store(token.clone()).await;
        Ok(token)
    }
}
