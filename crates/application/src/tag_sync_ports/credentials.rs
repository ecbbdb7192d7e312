use async_trait::async_trait;
use tagsync_core::{AccessToken, AppResult};

/// Identity provider port issuing bearer tokens for the management API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a token valid for management API calls.
    async fn access_token(&self) -> AppResult<AccessToken>;
}
