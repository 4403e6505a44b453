//! Cache cluster boundary
//!
//! The coordinator writes derived user state through [`CacheStore`], a
//! hash-per-key model: a key holds either a field map (user aggregates,
//! projections) or a single scalar (the short-TTL balance entry). The
//! bundled [`MemoryCache`] keeps everything in a concurrent map with lazy
//! TTL expiry; a cluster-backed implementation maps the same calls onto
//! `HSET`/`SET EX`/`DEL`.
//!
//! Every operation is an overwrite or a deletion. Replaying any sequence
//! of writes converges to the same state, which is what lets the
//! coordinator fire and forget.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use types::errors::SyncError;
use types::sync::FieldValue;

/// Storage contract for derived user state.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Merge `fields` into the map at `key`, creating the key if absent.
    async fn upsert_fields(
        &self,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<(), SyncError>;

    /// Merge `fields` only if `key` already exists. Returns whether it did.
    async fn upsert_fields_if_exists(
        &self,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<bool, SyncError>;

    /// Overwrite `key` with a single scalar, optionally expiring.
    async fn put_scalar(
        &self,
        key: &str,
        value: FieldValue,
        ttl: Option<Duration>,
    ) -> Result<(), SyncError>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, SyncError>;

    /// Field map at `key`, if the key holds one and has not expired.
    async fn get_fields(&self, key: &str)
        -> Result<Option<BTreeMap<String, FieldValue>>, SyncError>;

    /// Scalar at `key`, if the key holds one and has not expired.
    async fn get_scalar(&self, key: &str) -> Result<Option<FieldValue>, SyncError>;
}

enum StoredValue {
    Fields(BTreeMap<String, FieldValue>),
    Scalar(FieldValue),
}

struct CacheEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process [`CacheStore`] with lazy TTL expiry.
///
/// Expired entries are dropped on the read or write that touches them;
/// nothing sweeps in the background.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-expired entries.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }
}

fn empty_fields_entry() -> CacheEntry {
    CacheEntry {
        value: StoredValue::Fields(BTreeMap::new()),
        expires_at: None,
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn upsert_fields(
        &self,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<(), SyncError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(empty_fields_entry);
        if entry.is_expired(now) {
            *entry = empty_fields_entry();
        }
        match &mut entry.value {
            StoredValue::Fields(existing) => existing.extend(fields),
            other => *other = StoredValue::Fields(fields),
        }
        Ok(())
    }

    async fn upsert_fields_if_exists(
        &self,
        key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<bool, SyncError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                return Ok(false);
            }
            match &mut entry.value {
                StoredValue::Fields(existing) => existing.extend(fields),
                other => *other = StoredValue::Fields(fields),
            }
            return Ok(true);
        }
        Ok(false)
    }

    async fn put_scalar(
        &self,
        key: &str,
        value: FieldValue,
        ttl: Option<Duration>,
    ) -> Result<(), SyncError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: StoredValue::Scalar(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, SyncError> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(Instant::now()) => Ok(true),
            _ => Ok(false),
        }
    }

    async fn get_fields(
        &self,
        key: &str,
    ) -> Result<Option<BTreeMap<String, FieldValue>>, SyncError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                drop(entry);
                self.entries.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.value {
                StoredValue::Fields(map) => Ok(Some(map.clone())),
                StoredValue::Scalar(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn get_scalar(&self, key: &str) -> Result<Option<FieldValue>, SyncError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                drop(entry);
                self.entries.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.value {
                StoredValue::Scalar(value) => Ok(Some(value.clone())),
                StoredValue::Fields(_) => Ok(None),
            },
            None => Ok(None),
        }
    }
}
