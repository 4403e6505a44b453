//! Types library for the trading platform backend
//!
//! This library provides the core type definitions shared across the
//! platform services: identifier newtypes, the order-lifecycle identifier
//! model, cache synchronization events, and the error taxonomy.
//!
//! # Version
//! v1.0.0
//!
//! # Modules
//! - `ids`: Identifier newtypes (OrderId, UserId, LifecycleId)
//! - `lifecycle`: Lifecycle identifier roles, statuses, and records
//! - `sync`: Cache synchronization events and commit-hook context
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod lifecycle;
pub mod sync;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::lifecycle::*;
    pub use crate::sync::*;
    pub use crate::errors::*;
}
