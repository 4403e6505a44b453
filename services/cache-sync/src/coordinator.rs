//! Post-commit cache fan-out
//!
//! [`SyncCoordinator::sync_user_after_change`] runs after a
//! balance-affecting mutation has committed to the authoritative store.
//! It pushes the changed fields into the per-user cache keys, invalidates
//! derived entries, and publishes one [`CacheSyncEvent`]. Every step is
//! individually guarded: failures are logged and counted, never returned.
//! The authoritative store has already committed by the time we run, so
//! there is nothing correct to do with an error except record it and let
//! the reconciliation sweep repair the cache later.
//!
//! All cache writes are overwrites or deletions keyed by user identity.
//! Replaying a call, in full or in part, converges to the same state.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use types::errors::SyncError;
use types::ids::UserId;
use types::sync::{CacheSyncEvent, FieldValue, SyncContext, UserType};

use crate::bus::EventPublisher;
use crate::cache::CacheStore;

/// Cache key kinds invalidated (deleted, not recomputed) on every sync.
pub const DERIVED_KINDS: [&str; 4] = [
    "margin_calc",
    "trade_stats",
    "account_summary",
    "dashboard_summary",
];

/// The one latency-critical field that also gets a dedicated scalar entry.
pub const BALANCE_FIELD: &str = "wallet_balance";

/// Freshness marker merged into every field-map write.
pub const FRESHNESS_FIELD: &str = "last_synced_at";

/// Tuning for the coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Leading segment of every cache key.
    pub key_prefix: String,
    /// Per-step deadline. A stuck cache call is abandoned, not awaited.
    pub step_timeout_ms: u64,
    /// Lifetime of the scalar balance entry. Bounds worst-case staleness
    /// even if every later sync for the user is lost.
    pub balance_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            key_prefix: "platform".to_string(),
            step_timeout_ms: 2_000,
            balance_ttl_secs: 30,
        }
    }
}

/// Fans out one committed change to cache keys and event channels.
pub struct SyncCoordinator {
    cache: Arc<dyn CacheStore>,
    publisher: Arc<dyn EventPublisher>,
    config: SyncConfig,
    syncs_completed: AtomicU64,
    step_failures: AtomicU64,
    events_published: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(cache: Arc<dyn CacheStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(cache, publisher, SyncConfig::default())
    }

    pub fn with_config(
        cache: Arc<dyn CacheStore>,
        publisher: Arc<dyn EventPublisher>,
        config: SyncConfig,
    ) -> Self {
        info!(
            key_prefix = %config.key_prefix,
            step_timeout_ms = config.step_timeout_ms,
            balance_ttl_secs = config.balance_ttl_secs,
            "sync coordinator initialized"
        );
        Self {
            cache,
            publisher,
            config,
            syncs_completed: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
        }
    }

    /// Propagate a committed change for one user into the cache tier.
    ///
    /// Must only be called after the triggering transaction has committed.
    /// Never fails: each step swallows its own errors.
    pub async fn sync_user_after_change(
        &self,
        user_id: UserId,
        user_type: UserType,
        changed_fields: BTreeMap<String, FieldValue>,
        context: &SyncContext,
    ) {
        let now = Utc::now();
        let field_names = changed_fields
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        let mut with_freshness = changed_fields.clone();
        with_freshness.insert(
            FRESHNESS_FIELD.to_string(),
            FieldValue::Text(now.to_rfc3339()),
        );

        // 1. primary per-user aggregate
        let user_key = self.key("user", user_type, user_id);
        self.guarded(
            "primary_aggregate",
            user_id,
            user_type,
            &field_names,
            self.cache.upsert_fields(&user_key, with_freshness.clone()),
        )
        .await;

        // 2. short-TTL scalar for the latency-critical balance read path
        if let Some(balance) = changed_fields.get(BALANCE_FIELD) {
            let balance_key = self.key("balance", user_type, user_id);
            let ttl = Duration::from_secs(self.config.balance_ttl_secs);
            self.guarded(
                "balance_scalar",
                user_id,
                user_type,
                &field_names,
                self.cache.put_scalar(&balance_key, balance.clone(), Some(ttl)),
            )
            .await;
        }

        // 3. portfolio projection, refreshed only for users that have one
        let portfolio_key = self.key("portfolio", user_type, user_id);
        if let Some(existed) = self
            .guarded(
                "portfolio_projection",
                user_id,
                user_type,
                &field_names,
                self.cache
                    .upsert_fields_if_exists(&portfolio_key, with_freshness),
            )
            .await
        {
            debug!(
                user_id = user_id.as_i64(),
                existed, "portfolio projection refresh"
            );
        }

        // 4. invalidate derived entries so readers recompute lazily
        for kind in DERIVED_KINDS {
            let derived_key = self.key(kind, user_type, user_id);
            self.guarded(
                kind,
                user_id,
                user_type,
                &field_names,
                self.cache.delete(&derived_key),
            )
            .await;
        }

        // 5. announce the change on both channels
        let event = CacheSyncEvent::new(
            user_id,
            user_type,
            changed_fields,
            context.operation,
            context.source.clone(),
            now,
        );
        if self
            .guarded(
                "publish_event",
                user_id,
                user_type,
                &field_names,
                self.publisher.publish(&event),
            )
            .await
            .is_some()
        {
            self.events_published.fetch_add(1, Ordering::Relaxed);
        }

        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            user_id = user_id.as_i64(),
            user_type = %user_type,
            operation = %context.operation,
            correlation_id = %context.correlation_id,
            "user cache sync completed"
        );
    }

    fn key(&self, kind: &str, user_type: UserType, user_id: UserId) -> String {
        format!(
            "{}:{}:{}:{}",
            self.config.key_prefix,
            kind,
            user_type,
            user_id.as_i64()
        )
    }

    /// Run one step under the step deadline. Failures and timeouts are
    /// logged with the full mutation context and converted to `None`.
    async fn guarded<T>(
        &self,
        step: &str,
        user_id: UserId,
        user_type: UserType,
        field_names: &str,
        operation: impl Future<Output = Result<T, SyncError>>,
    ) -> Option<T> {
        let deadline = Duration::from_millis(self.config.step_timeout_ms);
        let error = match tokio::time::timeout(deadline, operation).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(err)) => err,
            Err(_) => SyncError::Timeout {
                timeout_ms: self.config.step_timeout_ms,
            },
        };
        self.step_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            step,
            user_id = user_id.as_i64(),
            user_type = %user_type,
            changed_fields = field_names,
            error = %error,
            "cache sync step failed"
        );
        None
    }

    pub fn syncs_completed(&self) -> u64 {
        self.syncs_completed.load(Ordering::Relaxed)
    }

    pub fn step_failures(&self) -> u64 {
        self.step_failures.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
