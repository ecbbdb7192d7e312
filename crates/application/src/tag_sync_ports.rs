mod credentials;
mod queue;
mod resource_graph;
mod stores;

pub use credentials::TokenSource;
pub use queue::{QueuedTagUpdate, TagUpdateQueue};
pub use resource_graph::{ProviderResourceType, ResourceGraphProvider, ResourceTagPatch};
pub use stores::{AuditConfigRepository, AuditStatsRepository, InvalidResourceTypeRepository};
