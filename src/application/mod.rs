//! Application Layer - Use cases and application services
//!
//! This module orchestrates the business logic and coordinates between
//! the domain and infrastructure layers.

pub mod defaults;
pub mod enrichment;
pub mod errors;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod status;
pub mod sync;


pub use enrichment::{EnrichmentRuleEngine, LookupProvider};
pub use errors::*;
pub use registry::{RuleRegistry, SourceRegistry};
pub use scheduler::{SyncRunner, SyncScheduler, calculate_next_sync};
pub use services::{IntegrationService, IntegrationServiceImpl, RecordProvider};
pub use status::{IntegrationStatusAggregator, SyncHistory};
pub use sync::{SERVICE_UNAVAILABLE_WARNING, SyncPipeline};
