//! Error taxonomy shared across the platform core
//!
//! Validation, ledger, allocator, and sync errors live here so every crate
//! speaks the same failure language. Ledger errors propagate to callers;
//! sync errors are caught inside the coordinator and never surface.

use crate::lifecycle::LifecycleStatus;
use thiserror::Error;

/// Malformed identifier or input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty identifier")]
    Empty,

    #[error("identifier body is not numeric: {id}")]
    NonNumeric { id: String },

    #[error("identifier {id} has length {actual}, expected {expected}")]
    UnexpectedLength {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("type tag too long: {tag}")]
    TagTooLong { tag: String },

    #[error("type tag must be ASCII alphabetic: {tag}")]
    InvalidTag { tag: String },

    #[error("worker id {worker_id} out of range (max {max})")]
    WorkerIdOutOfRange { worker_id: u16, max: u16 },
}

/// Errors surfaced by the lifecycle ledger and resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("lifecycle id not found: {lifecycle_id}")]
    NotFound { lifecycle_id: String },

    #[error("lifecycle id already recorded: {lifecycle_id}")]
    DuplicateId { lifecycle_id: String },

    #[error("active-record conflict for order {order_id} ({id_type}) after {attempts} attempts")]
    Conflict {
        order_id: String,
        id_type: String,
        attempts: u32,
    },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleStatus,
        to: LifecycleStatus,
    },

    #[error("record store error: {0}")]
    Store(String),
}

/// Errors surfaced by the id allocator.
///
/// Ordinary sequence exhaustion blocks until the clock advances and is not
/// an error; `Exhausted` fires only when the wait budget elapses without
/// progress (stalled or regressing clock). Fatal for that call only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(
        "sequence exhausted and clock did not advance within {budget_ms}ms \
         (last_ms={last_ms}, now_ms={now_ms})"
    )]
    Exhausted {
        last_ms: i64,
        now_ms: i64,
        budget_ms: u64,
    },
}

/// Internal failures of the cache sync fan-out.
///
/// Never propagated to the commit-hook caller; logged and discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("cache operation failed: {0}")]
    Cache(String),

    #[error("step timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("event publish failed: {0}")]
    Publish(String),

    #[error("event channel closed: {channel}")]
    ChannelClosed { channel: String },

    #[error("sync queue full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::NonNumeric {
            id: "17x81".to_string(),
        };
        assert_eq!(err.to_string(), "identifier body is not numeric: 17x81");
    }

    #[test]
    fn test_ledger_error_from_validation() {
        let err: LedgerError = ValidationError::Empty.into();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(err.to_string(), "invalid input: empty identifier");
    }

    #[test]
    fn test_conflict_error_display() {
        let err = LedgerError::Conflict {
            order_id: "ORD1".to_string(),
            id_type: "stoploss-add".to_string(),
            attempts: 4,
        };
        assert!(err.to_string().contains("ORD1"));
        assert!(err.to_string().contains("stoploss-add"));
        assert!(err.to_string().contains("4"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = LedgerError::InvalidTransition {
            from: LifecycleStatus::Replaced,
            to: LifecycleStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition from replaced to cancelled"
        );
    }

    #[test]
    fn test_allocator_exhausted_display() {
        let err = AllocatorError::Exhausted {
            last_ms: 1000,
            now_ms: 999,
            budget_ms: 200,
        };
        assert!(err.to_string().contains("200ms"));
    }

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::QueueFull { capacity: 1024 };
        assert_eq!(err.to_string(), "sync queue full (capacity 1024)");
    }
}
