//! Cache synchronization event model
//!
//! After a balance-affecting mutation commits, the coordinator fans the
//! change out to the cache cluster and publishes a [`CacheSyncEvent`] for
//! interested consumers. Events are fire-and-forget: subscribers must
//! tolerate duplicates and out-of-order delivery.

use crate::ids::UserId;
use crate::lifecycle::LifecycleIdType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Account environment. Live and demo users never share cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Live,
    Demo,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Live => "live",
            UserType::Demo => "demo",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Balance-affecting operation that triggered a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    OrderPlace,
    OrderClose,
    OrderCancel,
    OrderModify,
    StopLossAdd,
    StopLossCancel,
    TakeProfitAdd,
    TakeProfitCancel,
    WalletDeposit,
    WalletWithdraw,
    WalletAdjustment,
}

impl OperationType {
    /// Wire name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::OrderPlace => "ORDER_PLACE",
            OperationType::OrderClose => "ORDER_CLOSE",
            OperationType::OrderCancel => "ORDER_CANCEL",
            OperationType::OrderModify => "ORDER_MODIFY",
            OperationType::StopLossAdd => "STOP_LOSS_ADD",
            OperationType::StopLossCancel => "STOP_LOSS_CANCEL",
            OperationType::TakeProfitAdd => "TAKE_PROFIT_ADD",
            OperationType::TakeProfitCancel => "TAKE_PROFIT_CANCEL",
            OperationType::WalletDeposit => "WALLET_DEPOSIT",
            OperationType::WalletWithdraw => "WALLET_WITHDRAW",
            OperationType::WalletAdjustment => "WALLET_ADJUSTMENT",
        }
    }

    /// The identifier slot this operation issues an id for, if any.
    /// Wallet operations touch balances without minting order ids.
    pub fn lifecycle_id_type(&self) -> Option<LifecycleIdType> {
        match self {
            OperationType::OrderPlace => Some(LifecycleIdType::Placement),
            OperationType::OrderClose => Some(LifecycleIdType::Close),
            OperationType::OrderCancel => Some(LifecycleIdType::Cancel),
            OperationType::OrderModify => Some(LifecycleIdType::Modify),
            OperationType::StopLossAdd => Some(LifecycleIdType::StoplossAdd),
            OperationType::StopLossCancel => Some(LifecycleIdType::StoplossCancel),
            OperationType::TakeProfitAdd => Some(LifecycleIdType::TakeprofitAdd),
            OperationType::TakeProfitCancel => Some(LifecycleIdType::TakeprofitCancel),
            OperationType::WalletDeposit
            | OperationType::WalletWithdraw
            | OperationType::WalletAdjustment => None,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scalar value carried in a change set.
///
/// Untagged on the wire so consumers see plain JSON scalars. Decimals travel
/// as strings ("1500.50") to avoid float rounding; numeric-looking strings
/// therefore deserialize as `Decimal`, which is the intended reading for
/// balance fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Change notification published after a committed mutation.
///
/// `updated_fields` is sorted by key so serialized events are byte-stable
/// for a given change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSyncEvent {
    pub user_id: UserId,
    pub user_type: UserType,
    pub updated_fields: BTreeMap<String, FieldValue>,
    pub event_type: OperationType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl CacheSyncEvent {
    pub fn new(
        user_id: UserId,
        user_type: UserType,
        updated_fields: BTreeMap<String, FieldValue>,
        event_type: OperationType,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            user_type,
            updated_fields,
            event_type,
            source: source.into(),
            timestamp,
        }
    }
}

/// Metadata accompanying a commit-hook invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    pub operation: OperationType,
    /// Who performed the mutation (user id, admin id, or system task name).
    pub actor_id: String,
    /// Correlates the commit with downstream sync activity in logs.
    pub correlation_id: Uuid,
    /// Name of the committing service.
    pub source: String,
}

impl SyncContext {
    /// Build a context with a fresh time-ordered correlation id.
    pub fn new(operation: OperationType, actor_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            operation,
            actor_id: actor_id.into(),
            correlation_id: Uuid::now_v7(),
            source: source.into(),
        }
    }
}
