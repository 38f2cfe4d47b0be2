//! Domain Layer - Core entities, value objects and rule evaluation
//!
//! This module holds the source and rule model shared by the scheduler, the
//! resilience layer and the enrichment engine, plus the pure condition
//! evaluation logic.

pub mod entities;
pub mod errors;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use services::*;
pub use value_objects::*;
