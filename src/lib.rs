//! Asset enrichment engine - resilient external feed synchronization
//!
//! Periodically syncs heterogeneous external feeds (vulnerability, threat
//! intelligence, compliance, discovery, cost and performance sources) behind
//! a self-monitoring resilience layer, and applies declarative enrichment
//! rules to domain records. Layered as domain / application / infrastructure.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
