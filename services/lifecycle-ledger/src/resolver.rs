//! Historical id resolution
//!
//! External confirmations can reference an id long after it was replaced,
//! cancelled, or executed; the resolver maps any recorded id back to its
//! owning order. Reads go through the same store the ledger writes to, so
//! a resolve issued after a successful write always observes it.

use std::sync::Arc;

use tracing::debug;

use types::errors::LedgerError;
use types::ids::{LifecycleId, OrderId};
use types::lifecycle::LifecycleRecord;

use crate::store::RecordStore;

pub struct IdResolver {
    store: Arc<dyn RecordStore>,
}

impl IdResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Owning order for any recorded id, regardless of current status.
    pub async fn resolve(&self, lifecycle_id: &LifecycleId) -> Result<OrderId, LedgerError> {
        Ok(self.lookup(lifecycle_id).await?.order_id)
    }

    /// Full record behind an id.
    pub async fn lookup(&self, lifecycle_id: &LifecycleId) -> Result<LifecycleRecord, LedgerError> {
        match self.store.get(lifecycle_id).await {
            Ok(Some(record)) => {
                debug!(
                    lifecycle_id = %record.lifecycle_id,
                    order_id = %record.order_id,
                    status = %record.status,
                    "lifecycle id resolved"
                );
                Ok(record)
            }
            Ok(None) => Err(LedgerError::NotFound {
                lifecycle_id: lifecycle_id.to_string(),
            }),
            Err(err) => Err(LedgerError::Store(err.to_string())),
        }
    }
}
