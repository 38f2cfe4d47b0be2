//! Infrastructure Layer - External concerns and implementations
//!
//! Feed adapters, connectivity probing, the resilience manager and the
//! catalogue store.

pub mod adapters;
pub mod connectivity;
pub mod executor;
pub mod repositories;
pub mod resilience;

pub use adapters::{FeedClient, SourceAdapter, SyncBatch};
pub use connectivity::{AssumeOnline, ConnectivityProbe, HttpConnectivityProbe};
pub use executor::SyncExecutor;
pub use repositories::{InMemoryIntegrationStore, IntegrationStore, JsonFileIntegrationStore};
pub use resilience::*;
