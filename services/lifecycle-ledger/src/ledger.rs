//! Lifecycle event recording
//!
//! `record_lifecycle_event` is the single write path for issued ids. It
//! reads the slot's active record, then attempts a conditional insert that
//! supersedes exactly that record; when another writer lands in between,
//! the store reports a conflict and the call re-reads and retries with a
//! doubling backoff. Two concurrent writers can therefore never both
//! believe they replaced the same predecessor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use types::errors::LedgerError;
use types::ids::{LifecycleId, OrderId};
use types::lifecycle::{LifecycleIdType, LifecycleOutcome, LifecycleRecord};

use crate::store::{OutcomeWrite, RecordStore, StoreError};

/// Configuration for the ledger's conflict-retry discipline.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Conditional-insert retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry.
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 2,
        }
    }
}

/// Append-only ledger of issued lifecycle identifiers.
pub struct LifecycleLedger {
    store: Arc<dyn RecordStore>,
    config: LedgerConfig,
    /// Events recorded successfully.
    recorded: AtomicU64,
    /// Conditional inserts retried after a slot conflict.
    conflict_retries: AtomicU64,
    /// Terminal outcomes applied (idempotent replays not counted).
    status_updates: AtomicU64,
}

impl LifecycleLedger {
    /// Create a ledger with the default retry discipline.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<dyn RecordStore>, config: LedgerConfig) -> Self {
        info!(
            max_retries = config.max_retries,
            retry_backoff_ms = config.retry_backoff_ms,
            "LifecycleLedger initialized"
        );
        Self {
            store,
            config,
            recorded: AtomicU64::new(0),
            conflict_retries: AtomicU64::new(0),
            status_updates: AtomicU64::new(0),
        }
    }

    /// Record a newly issued id for its slot, superseding the slot's
    /// current active record if one exists.
    ///
    /// The previous active record (if any) transitions to `replaced` with
    /// `replaced_by` pointing at `lifecycle_id`, in the same store
    /// transaction that inserts the new record. A lifecycle id may only
    /// ever be recorded once; reusing one fails with
    /// [`LedgerError::DuplicateId`] and is never retried.
    pub async fn record_lifecycle_event(
        &self,
        order_id: OrderId,
        id_type: LifecycleIdType,
        lifecycle_id: LifecycleId,
        notes: Option<String>,
    ) -> Result<LifecycleRecord, LedgerError> {
        let mut attempt: u32 = 0;
        let mut delay_ms = self.config.retry_backoff_ms;

        loop {
            attempt += 1;
            let current = self
                .store
                .get_active(&order_id, id_type)
                .await
                .map_err(map_store)?;
            let expected = current.map(|record| record.lifecycle_id);
            let superseded = expected.is_some();

            let record = LifecycleRecord::new(
                order_id.clone(),
                id_type,
                lifecycle_id.clone(),
                notes.clone(),
                Utc::now(),
            );

            match self.store.insert_active(record, expected).await {
                Ok(stored) => {
                    self.recorded.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        order_id = %stored.order_id,
                        id_type = %stored.id_type,
                        lifecycle_id = %stored.lifecycle_id,
                        superseded,
                        "lifecycle event recorded"
                    );
                    return Ok(stored);
                }
                Err(StoreError::SlotConflict { .. }) if attempt <= self.config.max_retries => {
                    self.conflict_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        order_id = %order_id,
                        id_type = %id_type,
                        attempt,
                        delay_ms,
                        "active record moved; retrying conditional insert"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
                Err(StoreError::SlotConflict { .. }) => {
                    return Err(LedgerError::Conflict {
                        order_id: order_id.to_string(),
                        id_type: id_type.to_string(),
                        attempts: attempt,
                    });
                }
                Err(other) => return Err(map_store(other)),
            }
        }
    }

    /// Apply a terminal outcome to the record holding `lifecycle_id`.
    ///
    /// Replaying the same outcome is an idempotent no-op (external venues
    /// redeliver confirmations); any other transition out of a terminal
    /// status fails with [`LedgerError::InvalidTransition`].
    pub async fn update_status(
        &self,
        lifecycle_id: &LifecycleId,
        outcome: LifecycleOutcome,
        notes: Option<String>,
    ) -> Result<LifecycleRecord, LedgerError> {
        let write = self
            .store
            .mark_outcome_if_active(lifecycle_id, outcome, notes)
            .await
            .map_err(map_store)?;

        match write {
            OutcomeWrite::Applied(record) => {
                self.status_updates.fetch_add(1, Ordering::Relaxed);
                info!(
                    lifecycle_id = %record.lifecycle_id,
                    order_id = %record.order_id,
                    status = %record.status,
                    "lifecycle status updated"
                );
                Ok(record)
            }
            OutcomeWrite::NotActive(record) if record.status == outcome.as_status() => {
                debug!(
                    lifecycle_id = %record.lifecycle_id,
                    status = %record.status,
                    "status update replayed; no change"
                );
                Ok(record)
            }
            OutcomeWrite::NotActive(record) => Err(LedgerError::InvalidTransition {
                from: record.status,
                to: outcome.as_status(),
            }),
        }
    }

    /// The slot's current active record, if any.
    pub async fn get_active(
        &self,
        order_id: &OrderId,
        id_type: LifecycleIdType,
    ) -> Result<Option<LifecycleRecord>, LedgerError> {
        self.store
            .get_active(order_id, id_type)
            .await
            .map_err(map_store)
    }

    /// Every record for the order, ascending `created_at`.
    pub async fn get_history(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<LifecycleRecord>, LedgerError> {
        self.store.history(order_id).await.map_err(map_store)
    }

    /// History grouped per slot, preserving `created_at` order within each
    /// group.
    pub async fn get_history_grouped(
        &self,
        order_id: &OrderId,
    ) -> Result<std::collections::BTreeMap<LifecycleIdType, Vec<LifecycleRecord>>, LedgerError>
    {
        let mut grouped: std::collections::BTreeMap<LifecycleIdType, Vec<LifecycleRecord>> =
            std::collections::BTreeMap::new();
        for record in self.get_history(order_id).await? {
            grouped.entry(record.id_type).or_default().push(record);
        }
        Ok(grouped)
    }

    /// Follow `replaced_by` links from the given record to the end of its
    /// chain. The chain is ordered by construction: every link's
    /// `created_at` is strictly greater than its predecessor's.
    pub async fn replacement_chain(
        &self,
        lifecycle_id: &LifecycleId,
    ) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let mut current = self
            .store
            .get(lifecycle_id)
            .await
            .map_err(map_store)?
            .ok_or_else(|| LedgerError::NotFound {
                lifecycle_id: lifecycle_id.to_string(),
            })?;

        let mut chain = vec![current.clone()];
        while let Some(next_id) = current.replaced_by.clone() {
            match self.store.get(&next_id).await.map_err(map_store)? {
                Some(next) => {
                    chain.push(next.clone());
                    current = next;
                }
                None => {
                    return Err(LedgerError::Store(format!(
                        "broken replacement link to {next_id}"
                    )))
                }
            }
        }
        Ok(chain)
    }

    /// Events recorded since creation.
    pub fn events_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Conflict retries since creation.
    pub fn conflict_retries(&self) -> u64 {
        self.conflict_retries.load(Ordering::Relaxed)
    }

    /// Terminal outcomes applied since creation.
    pub fn status_updates(&self) -> u64 {
        self.status_updates.load(Ordering::Relaxed)
    }
}

fn map_store(err: StoreError) -> LedgerError {
    match err {
        StoreError::NotFound { lifecycle_id } => LedgerError::NotFound { lifecycle_id },
        StoreError::DuplicateId { lifecycle_id } => LedgerError::DuplicateId { lifecycle_id },
        other => LedgerError::Store(other.to_string()),
    }
}
