//! Record storage seam for the lifecycle ledger
//!
//! The ledger talks to its backing store through [`RecordStore`], whose key
//! primitive is a conditional insert: a new active record lands only if the
//! slot's current active id still matches what the caller read. The bundled
//! [`MemoryRecordStore`] provides those semantics in process; a relational
//! implementation maps them onto `INSERT` plus
//! `UPDATE .. WHERE status = 'active'` inside one transaction, treating a
//! zero row count as the conflict signal.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use types::ids::{LifecycleId, OrderId};
use types::lifecycle::{LifecycleIdType, LifecycleOutcome, LifecycleRecord, LifecycleStatus};

/// Failures below the ledger's retry layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The slot's active record changed between the caller's read and this
    /// write.
    #[error("active record changed for slot ({order_id}, {id_type})")]
    SlotConflict { order_id: String, id_type: String },

    /// The lifecycle id already exists somewhere in the store.
    #[error("lifecycle id already recorded: {lifecycle_id}")]
    DuplicateId { lifecycle_id: String },

    #[error("record not found: {lifecycle_id}")]
    NotFound { lifecycle_id: String },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result of a conditional terminal-status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeWrite {
    /// The record was active and now carries the outcome status.
    Applied(LifecycleRecord),
    /// The record was already terminal; returned unchanged.
    NotActive(LifecycleRecord),
}

/// Storage contract for lifecycle records.
///
/// Implementations assign commit timestamps: `created_at` is strictly
/// increasing across every record one store instance ever accepts, which is
/// what makes per-order history and replacement chains totally ordered.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically: verify `expected_active` still matches the slot's active
    /// record, mark that record replaced (linking `replaced_by` to the new
    /// id), and insert `record` as the slot's new active record.
    ///
    /// Fails with [`StoreError::SlotConflict`] when the active record moved
    /// and [`StoreError::DuplicateId`] when `record.lifecycle_id` already
    /// exists. Returns the record as stored.
    async fn insert_active(
        &self,
        record: LifecycleRecord,
        expected_active: Option<LifecycleId>,
    ) -> Result<LifecycleRecord, StoreError>;

    /// Point read by globally-unique lifecycle id, any status.
    async fn get(&self, lifecycle_id: &LifecycleId)
        -> Result<Option<LifecycleRecord>, StoreError>;

    /// The slot's current active record, if any.
    async fn get_active(
        &self,
        order_id: &OrderId,
        id_type: LifecycleIdType,
    ) -> Result<Option<LifecycleRecord>, StoreError>;

    /// Set a terminal outcome only if the record is still active.
    async fn mark_outcome_if_active(
        &self,
        lifecycle_id: &LifecycleId,
        outcome: LifecycleOutcome,
        notes: Option<String>,
    ) -> Result<OutcomeWrite, StoreError>;

    /// Every record ever stored for the order, ascending `created_at`.
    async fn history(&self, order_id: &OrderId) -> Result<Vec<LifecycleRecord>, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<LifecycleId, LifecycleRecord>,
    /// Slot index: at most one active record per `(order_id, id_type)`.
    active: HashMap<(OrderId, LifecycleIdType), LifecycleId>,
    last_commit_at: Option<DateTime<Utc>>,
}

/// In-process [`RecordStore`] backed by a single lock.
///
/// One lock guards records, the slot index, and the commit timestamp so a
/// conditional insert is a single critical section; the lock is never held
/// across an await point.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<StoreInner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records ever stored.
    pub fn len(&self) -> usize {
        self.read_inner().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().records.is_empty()
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next commit timestamp: wall clock, bumped by a microsecond whenever
    /// the clock has not moved since the previous commit.
    fn commit_timestamp(inner: &mut StoreInner) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match inner.last_commit_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_commit_at = Some(ts);
        ts
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_active(
        &self,
        record: LifecycleRecord,
        expected_active: Option<LifecycleId>,
    ) -> Result<LifecycleRecord, StoreError> {
        let mut inner = self.write_inner();

        if inner.records.contains_key(&record.lifecycle_id) {
            return Err(StoreError::DuplicateId {
                lifecycle_id: record.lifecycle_id.to_string(),
            });
        }

        let slot = (record.order_id.clone(), record.id_type);
        let current = inner.active.get(&slot).cloned();
        if current != expected_active {
            return Err(StoreError::SlotConflict {
                order_id: record.order_id.to_string(),
                id_type: record.id_type.to_string(),
            });
        }

        let ts = Self::commit_timestamp(&mut inner);

        if let Some(prev_id) = current {
            match inner.records.get_mut(&prev_id) {
                Some(prev) => prev.mark_replaced(record.lifecycle_id.clone(), ts),
                None => {
                    return Err(StoreError::Backend(format!(
                        "slot index points at missing record {prev_id}"
                    )))
                }
            }
        }

        let mut stored = record;
        stored.created_at = ts;
        stored.updated_at = ts;
        inner.active.insert(slot, stored.lifecycle_id.clone());
        inner
            .records
            .insert(stored.lifecycle_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(
        &self,
        lifecycle_id: &LifecycleId,
    ) -> Result<Option<LifecycleRecord>, StoreError> {
        Ok(self.read_inner().records.get(lifecycle_id).cloned())
    }

    async fn get_active(
        &self,
        order_id: &OrderId,
        id_type: LifecycleIdType,
    ) -> Result<Option<LifecycleRecord>, StoreError> {
        let inner = self.read_inner();
        let Some(active_id) = inner.active.get(&(order_id.clone(), id_type)) else {
            return Ok(None);
        };
        Ok(inner.records.get(active_id).cloned())
    }

    async fn mark_outcome_if_active(
        &self,
        lifecycle_id: &LifecycleId,
        outcome: LifecycleOutcome,
        notes: Option<String>,
    ) -> Result<OutcomeWrite, StoreError> {
        let mut inner = self.write_inner();

        let current = match inner.records.get(lifecycle_id) {
            Some(record) => record.clone(),
            None => {
                return Err(StoreError::NotFound {
                    lifecycle_id: lifecycle_id.to_string(),
                })
            }
        };
        if current.status != LifecycleStatus::Active {
            return Ok(OutcomeWrite::NotActive(current));
        }

        let ts = Self::commit_timestamp(&mut inner);
        let updated = match inner.records.get_mut(lifecycle_id) {
            Some(record) => {
                record.mark_outcome(outcome, notes, ts);
                record.clone()
            }
            None => {
                return Err(StoreError::Backend(format!(
                    "record vanished mid-write: {lifecycle_id}"
                )))
            }
        };

        let slot = (updated.order_id.clone(), updated.id_type);
        if inner.active.get(&slot) == Some(lifecycle_id) {
            inner.active.remove(&slot);
        }
        Ok(OutcomeWrite::Applied(updated))
    }

    async fn history(&self, order_id: &OrderId) -> Result<Vec<LifecycleRecord>, StoreError> {
        let mut records: Vec<LifecycleRecord> = self
            .read_inner()
            .records
            .values()
            .filter(|record| &record.order_id == order_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
