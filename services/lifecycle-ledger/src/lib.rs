//! Lifecycle Ledger Service
//!
//! Tracks every identifier an order has ever carried. Each order holds one
//! slot per operation role (placement, close, cancel, modify, stop-loss and
//! take-profit management); recording a new id for a slot supersedes the
//! previous active id without deleting it, so any id ever handed to an
//! external venue remains resolvable.
//!
//! # Architecture
//!
//! ```text
//!  record_lifecycle_event / update_status        resolve / lookup
//!                │                                      │
//!          ┌─────▼──────┐                        ┌──────▼─────┐
//!          │  Ledger    │                        │  Resolver  │
//!          └─────┬──────┘                        └──────┬─────┘
//!                │      conditional insert / reads      │
//!          ┌─────▼──────────────────────────────────────▼─────┐
//!          │                 RecordStore                      │
//!          └──────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent writers to one slot are serialized by the store's conditional
//! insert plus a bounded retry loop; at any instant a slot has at most one
//! active record.

pub mod ledger;
pub mod resolver;
pub mod store;

pub use ledger::{LedgerConfig, LifecycleLedger};
pub use resolver::IdResolver;
pub use store::{MemoryRecordStore, OutcomeWrite, RecordStore, StoreError};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
