//! Azure Resource Manager implementation of the resource graph port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tagsync_application::{
    ProviderResourceType, ResourceGraphProvider, ResourceTagPatch, TokenSource,
};
use tagsync_core::{AppError, AppResult, SubscriptionId};
use tagsync_domain::{ResourceGroupView, ResourceView};
use tracing::debug;
use url::Url;

/// API version used for subscription-level listing calls.
pub const RESOURCE_MANAGER_API_VERSION: &str = "2021-04-01";

/// Management API client backed by `reqwest`.
pub struct AzureResourceManagerClient {
    http_client: reqwest::Client,
    endpoint: Url,
    token_source: Arc<dyn TokenSource>,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderDocument {
    #[serde(default)]
    resource_types: Vec<ProviderResourceTypeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderResourceTypeDocument {
    resource_type: String,
    #[serde(default)]
    api_versions: Vec<String>,
}

/// Which collaborator call failed, used to pick the error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Listing,
    ProviderLookup,
    TagWrite,
}

impl AzureResourceManagerClient {
    /// Creates a client for the given management endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: Url,
        token_source: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            token_source,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }

    /// Overrides retry behavior for throttled and server-error responses.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u8, retry_backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff_ms = retry_backoff_ms.max(50);
        self
    }

    async fn list_pages<T: DeserializeOwned>(&self, first_page: Url) -> AppResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_page);

        while let Some(url) = next.take() {
            let body = self
                .send_with_retry(CallKind::Listing, || self.http_client.get(url.clone()))
                .await?;
            let page: Page<T> = decode_body(CallKind::Listing, body.as_str())?;
            items.extend(page.value);

            next = page
                .next_link
                .filter(|link| !link.trim().is_empty())
                .map(|link| {
                    Url::parse(link.as_str()).map_err(|error| {
                        AppError::ResourceGraph(format!("invalid nextLink '{link}': {error}"))
                    })
                })
                .transpose()?;
        }

        Ok(items)
    }

    async fn send_with_retry<F>(&self, kind: CallKind, mut build: F) -> AppResult<String>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let token = self.token_source.access_token().await?;
            let response = build().bearer_auth(token.secret()).send().await;

            match response {
                Ok(response) if response.status().is_success() => {
                    return response.text().await.map_err(|error| {
                        categorize(kind, format!("failed to read response body: {error}"))
                    });
                }
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} from management API",
                        response.status()
                    ));
                }
                Ok(response) if response.status() == reqwest::StatusCode::UNAUTHORIZED => {
                    return Err(AppError::Unauthorized(
                        "management API rejected the access token".to_owned(),
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(categorize(
                        kind,
                        format!("management API call failed with status {status}: {body}"),
                    ));
                }
                Err(error) => {
                    last_error = Some(format!("management API transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                debug!(attempt, delay_ms = delay, "retrying management API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(categorize(
            kind,
            last_error.unwrap_or_else(|| "management API call exhausted retries".to_owned()),
        ))
    }
}

#[async_trait]
impl ResourceGraphProvider for AzureResourceManagerClient {
    async fn list_resource_groups(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Vec<ResourceGroupView>> {
        let url = subscription_url(
            &self.endpoint,
            subscription_id,
            &["resourcegroups"],
            RESOURCE_MANAGER_API_VERSION,
        )?;
        self.list_pages(url).await
    }

    async fn list_resources(
        &self,
        subscription_id: &SubscriptionId,
        resource_group: &str,
    ) -> AppResult<Vec<ResourceView>> {
        let url = subscription_url(
            &self.endpoint,
            subscription_id,
            &["resourceGroups", resource_group, "resources"],
            RESOURCE_MANAGER_API_VERSION,
        )?;
        self.list_pages(url).await
    }

    async fn list_provider_resource_types(
        &self,
        subscription_id: &SubscriptionId,
        provider_namespace: &str,
    ) -> AppResult<Vec<ProviderResourceType>> {
        let url = subscription_url(
            &self.endpoint,
            subscription_id,
            &["providers", provider_namespace],
            RESOURCE_MANAGER_API_VERSION,
        )?;
        let body = self
            .send_with_retry(CallKind::ProviderLookup, || self.http_client.get(url.clone()))
            .await?;
        let document: ProviderDocument = decode_body(CallKind::ProviderLookup, body.as_str())?;

        Ok(document
            .resource_types
            .into_iter()
            .map(|entry| ProviderResourceType {
                resource_type: entry.resource_type,
                api_versions: entry.api_versions,
            })
            .collect())
    }

    async fn get_resource(&self, resource_id: &str, api_version: &str) -> AppResult<ResourceView> {
        let url = resource_url(&self.endpoint, resource_id, api_version)?;
        let body = self
            .send_with_retry(CallKind::Listing, || self.http_client.get(url.clone()))
            .await?;
        decode_body(CallKind::Listing, body.as_str())
    }

    async fn update_resource_tags(
        &self,
        resource_id: &str,
        api_version: &str,
        patch: ResourceTagPatch,
    ) -> AppResult<()> {
        let url = resource_url(&self.endpoint, resource_id, api_version)?;
        let body = json!({
            "location": patch.location,
            "tags": patch.tags,
        });

        self.send_with_retry(CallKind::TagWrite, || {
            self.http_client.patch(url.clone()).json(&body)
        })
        .await?;

        Ok(())
    }
}

fn categorize(kind: CallKind, message: String) -> AppError {
    match kind {
        CallKind::Listing => AppError::ResourceGraph(message),
        CallKind::ProviderLookup => AppError::ProviderLookup(message),
        CallKind::TagWrite => AppError::TagWrite(message),
    }
}

fn decode_body<T: DeserializeOwned>(kind: CallKind, body: &str) -> AppResult<T> {
    serde_json::from_str(body)
        .map_err(|error| categorize(kind, format!("failed to decode management API response: {error}")))
}

fn subscription_url(
    endpoint: &Url,
    subscription_id: &SubscriptionId,
    segments: &[&str],
    api_version: &str,
) -> AppResult<Url> {
    let mut url = endpoint.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            AppError::Validation(format!("management endpoint '{endpoint}' cannot be a base"))
        })?;
        path.pop_if_empty()
            .push("subscriptions")
            .push(subscription_id.as_str())
            .extend(segments);
    }
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

fn resource_url(endpoint: &Url, resource_id: &str, api_version: &str) -> AppResult<Url> {
    if !resource_id.starts_with('/') {
        return Err(AppError::Validation(format!(
            "resource id '{resource_id}' must start with '/'"
        )));
    }

    let mut url = endpoint.clone();
    let base = url.path().trim_end_matches('/').to_owned();
    url.set_path(format!("{base}{resource_id}").as_str());
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use tagsync_core::{AppError, SubscriptionId};
    use tagsync_domain::{ResourceGroupView, ResourceView};
    use url::Url;

    use super::{
        CallKind, Page, ProviderDocument, decode_body, resource_url, subscription_url,
    };

    fn endpoint() -> Url {
        Url::parse("https://management.azure.com").unwrap_or_else(|_| unreachable!())
    }

    fn subscription() -> SubscriptionId {
        SubscriptionId::new("0000-1111").unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn listing_urls_encode_segments_and_api_version() {
        let groups = subscription_url(&endpoint(), &subscription(), &["resourcegroups"], "2021-04-01");
        assert_eq!(
            groups.map(String::from).ok().as_deref(),
            Some("https://management.azure.com/subscriptions/0000-1111/resourcegroups?api-version=2021-04-01")
        );

        let resources = subscription_url(
            &endpoint(),
            &subscription(),
            &["resourceGroups", "rg with space", "resources"],
            "2021-04-01",
        );
        assert_eq!(
            resources.map(String::from).ok().as_deref(),
            Some("https://management.azure.com/subscriptions/0000-1111/resourceGroups/rg%20with%20space/resources?api-version=2021-04-01")
        );
    }

    #[test]
    fn resource_url_appends_id_to_endpoint() {
        let url = resource_url(
            &endpoint(),
            "/subscriptions/0000-1111/resourceGroups/rg/providers/Microsoft.Web/sites/app",
            "2022-03-01",
        );
        assert_eq!(
            url.map(String::from).ok().as_deref(),
            Some("https://management.azure.com/subscriptions/0000-1111/resourceGroups/rg/providers/Microsoft.Web/sites/app?api-version=2022-03-01")
        );
        assert!(matches!(
            resource_url(&endpoint(), "relative/id", "2022-03-01"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn pages_decode_optional_tags_and_next_link() {
        let body = r#"{
            "value": [
                {"id": "/subscriptions/s/resourceGroups/a", "name": "a", "location": "westeurope", "tags": {"costCenter": "CC1"}},
                {"id": "/subscriptions/s/resourceGroups/b", "name": "b", "location": "westeurope"}
            ],
            "nextLink": "https://management.azure.com/next"
        }"#;

        let page: Page<ResourceGroupView> =
            decode_body(CallKind::Listing, body).unwrap_or_else(|_| unreachable!());
        assert_eq!(page.value.len(), 2);
        assert_eq!(
            page.value[0].tags.as_ref().and_then(|tags| tags.get("costCenter")).map(String::as_str),
            Some("CC1")
        );
        assert!(page.value[1].tags.is_none());
        assert_eq!(page.next_link.as_deref(), Some("https://management.azure.com/next"));
    }

    #[test]
    fn resource_view_reads_type_field() {
        let body = r#"{
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/x",
            "type": "Microsoft.Storage/storageAccounts",
            "location": "northeurope",
            "tags": null,
            "properties": {"ignored": true}
        }"#;

        let resource: ResourceView =
            decode_body(CallKind::Listing, body).unwrap_or_else(|_| unreachable!());
        assert_eq!(resource.resource_type, "Microsoft.Storage/storageAccounts");
        assert!(resource.tags.is_none());
    }

    #[test]
    fn provider_document_keeps_version_order() {
        let body = r#"{
            "namespace": "Microsoft.Storage",
            "resourceTypes": [
                {"resourceType": "storageAccounts", "apiVersions": ["2023-05-01", "2022-09-01"]}
            ]
        }"#;

        let document: ProviderDocument =
            decode_body(CallKind::ProviderLookup, body).unwrap_or_else(|_| unreachable!());
        assert_eq!(document.resource_types[0].api_versions[0], "2023-05-01");
    }

    #[test]
    fn decode_failures_carry_call_category() {
        assert!(matches!(
            decode_body::<ProviderDocument>(CallKind::ProviderLookup, "not json"),
            Err(AppError::ProviderLookup(_))
        ));
        assert!(matches!(
            decode_body::<ResourceView>(CallKind::TagWrite, "{}"),
            Err(AppError::TagWrite(_))
        ));
    }
}
