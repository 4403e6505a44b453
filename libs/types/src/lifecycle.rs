//! Order lifecycle identifier model
//!
//! Every order operation that leaves the platform (placement, close,
//! cancel, modify, stop-loss and take-profit management) is issued its own
//! identifier. The ledger tracks those identifiers per `(order, id_type)`
//! slot through a replace/cancel/execute lifecycle; records are superseded,
//! never deleted, so any historical id stays resolvable.

use crate::ids::{LifecycleId, OrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an issued identifier. Each order holds one ledger slot per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleIdType {
    /// Initial order placement
    Placement,
    /// Position close request
    Close,
    /// Order cancellation request
    Cancel,
    /// Order modification request
    Modify,
    /// Stop-loss attachment
    StoplossAdd,
    /// Stop-loss removal
    StoplossCancel,
    /// Take-profit attachment
    TakeprofitAdd,
    /// Take-profit removal
    TakeprofitCancel,
}

impl LifecycleIdType {
    /// All roles, in slot order.
    pub const ALL: [LifecycleIdType; 8] = [
        LifecycleIdType::Placement,
        LifecycleIdType::Close,
        LifecycleIdType::Cancel,
        LifecycleIdType::Modify,
        LifecycleIdType::StoplossAdd,
        LifecycleIdType::StoplossCancel,
        LifecycleIdType::TakeprofitAdd,
        LifecycleIdType::TakeprofitCancel,
    ];

    /// Wire/key label, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleIdType::Placement => "placement",
            LifecycleIdType::Close => "close",
            LifecycleIdType::Cancel => "cancel",
            LifecycleIdType::Modify => "modify",
            LifecycleIdType::StoplossAdd => "stoploss-add",
            LifecycleIdType::StoplossCancel => "stoploss-cancel",
            LifecycleIdType::TakeprofitAdd => "takeprofit-add",
            LifecycleIdType::TakeprofitCancel => "takeprofit-cancel",
        }
    }
}

impl fmt::Display for LifecycleIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single lifecycle record.
///
/// `Replaced`, `Cancelled` and `Executed` are terminal for the record; the
/// slot itself may later gain a fresh `Active` record, starting a new chain
/// link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Currently valid identifier for its slot
    Active,
    /// Superseded by a newer identifier (see `replaced_by`)
    Replaced,
    /// Cancelled by user or system (terminal)
    Cancelled,
    /// Confirmed executed by the external venue (terminal)
    Executed,
}

impl LifecycleStatus {
    /// Whether this status admits no further transitions for the record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Replaced => "replaced",
            LifecycleStatus::Cancelled => "cancelled",
            LifecycleStatus::Executed => "executed",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome a caller may apply to an active record.
///
/// Replacement is not an outcome: it happens implicitly when a new id is
/// recorded for the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOutcome {
    Cancelled,
    Executed,
}

impl LifecycleOutcome {
    pub fn as_status(&self) -> LifecycleStatus {
        match self {
            LifecycleOutcome::Cancelled => LifecycleStatus::Cancelled,
            LifecycleOutcome::Executed => LifecycleStatus::Executed,
        }
    }
}

/// One issued identifier and its fate.
///
/// Append-only history: a record is created `Active` and later marked
/// `Replaced`, `Cancelled` or `Executed`, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub order_id: OrderId,
    pub id_type: LifecycleIdType,
    pub lifecycle_id: LifecycleId,
    pub status: LifecycleStatus,
    /// Id of the record that superseded this one, when status is `Replaced`.
    pub replaced_by: Option<LifecycleId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LifecycleRecord {
    /// Create a new active record.
    pub fn new(
        order_id: OrderId,
        id_type: LifecycleIdType,
        lifecycle_id: LifecycleId,
        notes: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            id_type,
            lifecycle_id,
            status: LifecycleStatus::Active,
            replaced_by: None,
            notes,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Mark this record superseded by `successor`.
    ///
    /// # Panics
    /// Panics if the record is already terminal.
    pub fn mark_replaced(&mut self, successor: LifecycleId, timestamp: DateTime<Utc>) {
        assert!(
            !self.status.is_terminal(),
            "cannot replace a terminal record"
        );
        self.status = LifecycleStatus::Replaced;
        self.replaced_by = Some(successor);
        self.updated_at = timestamp;
    }

    /// Apply a terminal outcome.
    ///
    /// # Panics
    /// Panics if the record is already terminal.
    pub fn mark_outcome(
        &mut self,
        outcome: LifecycleOutcome,
        notes: Option<String>,
        timestamp: DateTime<Utc>,
    ) {
        assert!(
            !self.status.is_terminal(),
            "cannot transition a terminal record"
        );
        self.status = outcome.as_status();
        if notes.is_some() {
            self.notes = notes;
        }
        self.updated_at = timestamp;
    }
}
