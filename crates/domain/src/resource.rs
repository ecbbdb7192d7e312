use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tagsync_core::{AppError, AppResult};

use crate::tags::TagMap;

/// Resource group as returned by the resource graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupView {
    /// Resource group name.
    pub name: String,
    /// Group tags, absent when the group was never tagged.
    pub tags: Option<TagMap>,
}

/// Resource contained in a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    /// Fully qualified resource identifier.
    pub id: String,
    /// Fully qualified resource type, e.g. `Microsoft.Storage/storageAccounts`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Deployment region, empty for resources without one.
    #[serde(default)]
    pub location: String,
    /// Resource tags, absent when the resource was never tagged.
    pub tags: Option<TagMap>,
}

/// Parsed resource type split into provider namespace and short type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceType {
    namespace: String,
    short_name: String,
}

impl ResourceType {
    /// Parses `Namespace/type[/subtype...]`.
    pub fn parse(value: &str) -> AppResult<Self> {
        let value = value.trim();
        let Some((namespace, short_name)) = value.split_once('/') else {
            return Err(AppError::Validation(format!(
                "resource type '{value}' has no provider namespace"
            )));
        };

        if namespace.is_empty() || short_name.trim_matches('/').is_empty() {
            return Err(AppError::Validation(format!(
                "resource type '{value}' must look like 'Namespace/type'"
            )));
        }

        Ok(Self {
            namespace: namespace.to_owned(),
            short_name: short_name.trim_matches('/').to_owned(),
        })
    }

    /// Returns the provider namespace, e.g. `Microsoft.Storage`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the type name below the namespace, e.g. `storageAccounts`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.short_name.as_str()
    }
}

impl Display for ResourceType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.namespace, self.short_name)
    }
}
