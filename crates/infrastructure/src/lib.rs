//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod azure_resource_manager_client;
mod azure_token_source;
mod in_memory_tag_sync_repository;
mod in_memory_tag_update_queue;
mod postgres_tag_sync_repository;
mod postgres_tag_update_queue;
mod redis_tag_update_queue;
mod runtime_settings;

pub use azure_resource_manager_client::{AzureResourceManagerClient, RESOURCE_MANAGER_API_VERSION};
pub use azure_token_source::{
    ManagedIdentityEndpoint, ManagedIdentityTokenSource, ServicePrincipalTokenSource,
    management_scope,
};
pub use in_memory_tag_sync_repository::InMemoryTagSyncRepository;
pub use in_memory_tag_update_queue::InMemoryTagUpdateQueue;
pub use postgres_tag_sync_repository::PostgresTagSyncRepository;
pub use postgres_tag_update_queue::PostgresTagUpdateQueue;
pub use redis_tag_update_queue::RedisTagUpdateQueue;
pub use runtime_settings::{
    CredentialSettings, DEFAULT_TAG_QUEUE_NAME, ManagementSettings, TagQueueSettings,
};
