//! Shared primitives for all Rust crates in tagsync.

#![forbid(unsafe_code)]

/// Credential primitives shared across adapters.
pub mod credential;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use credential::AccessToken;

/// Result type used across tagsync crates.
pub type AppResult<T> = Result<T, AppError>;

/// Cloud subscription identifier used as the partition key for persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Creates a validated subscription identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(AppError::Validation(
                "subscription id must not be empty".to_owned(),
            ));
        }

        if value.contains('/') {
            return Err(AppError::Validation(format!(
                "subscription id '{value}' must not contain '/'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for SubscriptionId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubscriptionId> for String {
    fn from(value: SubscriptionId) -> Self {
        value.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated or credential acquisition failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// API version for a resource type could not be resolved.
    #[error("provider lookup error: {0}")]
    ProviderLookup(String),

    /// Listing resource groups or resources failed.
    #[error("resource graph error: {0}")]
    ResourceGraph(String),

    /// Tag write against the management API failed.
    #[error("tag write error: {0}")]
    TagWrite(String),

    /// Work queue transport failure.
    #[error("queue error: {0}")]
    Queue(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
