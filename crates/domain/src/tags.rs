use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag name to value mapping as carried by resource groups and resources.
pub type TagMap = BTreeMap<String, String>;

/// Subset of a resource group's tags whose names are configured as required.
///
/// Every key is one of the configured required tag names and every value is
/// copied verbatim from the resource group, including empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredTagSet(TagMap);

impl RequiredTagSet {
    /// Returns the number of required tags carried by the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the group carries none of the required tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value for one required tag name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates over required tag pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns true when the group carries every configured required tag.
    #[must_use]
    pub fn qualifies_for(&self, required_tag_names: &[String]) -> bool {
        required_tag_names
            .iter()
            .all(|name| self.0.contains_key(name.as_str()))
    }

    /// Returns the underlying mapping.
    #[must_use]
    pub fn as_map(&self) -> &TagMap {
        &self.0
    }
}

/// Extracts the required tags a resource group carries.
///
/// Absent group tags yield an empty set.
#[must_use]
pub fn compute_required_tags(
    group_tags: Option<&TagMap>,
    required_tag_names: &[String],
) -> RequiredTagSet {
    let Some(group_tags) = group_tags else {
        return RequiredTagSet::default();
    };

    let required = required_tag_names
        .iter()
        .filter_map(|name| {
            group_tags
                .get(name.as_str())
                .map(|value| (name.clone(), value.clone()))
        })
        .collect();

    RequiredTagSet(required)
}

/// Computes the tag delta a resource needs to satisfy the required set.
///
/// The result holds only entries that are missing on the resource or carry a
/// different value. An empty result means no write is needed. Tags on the
/// resource outside the required set never appear in the delta.
#[must_use]
pub fn compute_tag_updates(resource_tags: Option<&TagMap>, required: &RequiredTagSet) -> TagMap {
    let Some(resource_tags) = resource_tags else {
        return required.0.clone();
    };

    required
        .0
        .iter()
        .filter(|(name, value)| resource_tags.get(name.as_str()) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Merges a tag delta over a resource's existing tags.
#[must_use]
pub fn apply_tag_updates(resource_tags: Option<&TagMap>, updates: &TagMap) -> TagMap {
    let mut merged = resource_tags.cloned().unwrap_or_default();
    merged.extend(
        updates
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );
    merged
}
