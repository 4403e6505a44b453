//! End-to-end sync flow: commit hook through worker, coordinator, cache
//! and both event channels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use cache_sync::{
    spawn_sync_worker, CacheStore, MemoryCache, SyncCoordinator, SyncEventBus, BALANCE_FIELD,
    DEFAULT_QUEUE_CAPACITY, FRESHNESS_FIELD,
};
use types::ids::UserId;
use types::sync::{CacheSyncEvent, FieldValue, OperationType, SyncContext, UserType};

fn deposit_fields(amount: Decimal) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert(BALANCE_FIELD.to_string(), FieldValue::Decimal(amount));
    fields.insert("open_positions".to_string(), FieldValue::Integer(2));
    fields
}

async fn wait_for_syncs(coordinator: &SyncCoordinator, target: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.syncs_completed() < target {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sync jobs were never processed");
}

#[tokio::test]
async fn test_commit_hook_fans_out_to_cache_and_both_channels() {
    let cache = Arc::new(MemoryCache::new());
    let bus = Arc::new(SyncEventBus::new());
    let mut local_rx = bus.subscribe_local();
    let mut broadcast_rx = bus.subscribe_broadcast();

    let coordinator = Arc::new(SyncCoordinator::new(cache.clone(), bus));
    let shutdown = CancellationToken::new();
    let (handle, worker) =
        spawn_sync_worker(coordinator.clone(), DEFAULT_QUEUE_CAPACITY, shutdown.clone());

    let amount = Decimal::new(150_050, 2);
    handle.on_committed(
        UserId::new(42),
        UserType::Live,
        deposit_fields(amount),
        SyncContext::new(OperationType::WalletDeposit, "user-42", "wallet-service"),
    );
    wait_for_syncs(&coordinator, 1).await;

    // cache tier
    let aggregate = cache
        .get_fields("platform:user:live:42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate[BALANCE_FIELD], FieldValue::Decimal(amount));
    assert_eq!(aggregate["open_positions"], FieldValue::Integer(2));
    assert!(aggregate.contains_key(FRESHNESS_FIELD));
    assert_eq!(
        cache.get_scalar("platform:balance:live:42").await.unwrap(),
        Some(FieldValue::Decimal(amount))
    );

    // same-runtime channel
    let event = local_rx.recv().await.unwrap();
    assert_eq!(event.user_id, UserId::new(42));
    assert_eq!(event.user_type, UserType::Live);
    assert_eq!(event.event_type, OperationType::WalletDeposit);
    assert_eq!(event.source, "wallet-service");
    assert_eq!(event.updated_fields[BALANCE_FIELD], FieldValue::Decimal(amount));

    // cross-runtime channel carries the same event as JSON
    let json = broadcast_rx.recv().await.unwrap();
    let mirrored: CacheSyncEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(mirrored.user_id, event.user_id);
    assert_eq!(mirrored.updated_fields, event.updated_fields);
    assert_eq!(mirrored.timestamp, event.timestamp);

    assert_eq!(coordinator.step_failures(), 0);
    shutdown.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_repeating_a_sync_converges_to_the_same_cache_state() {
    let cache = Arc::new(MemoryCache::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        cache.clone(),
        Arc::new(SyncEventBus::new()),
    ));

    let amount = Decimal::new(99_999, 3);
    let fields = deposit_fields(amount);
    let context = SyncContext::new(OperationType::WalletDeposit, "user-8", "wallet-service");

    coordinator
        .sync_user_after_change(UserId::new(8), UserType::Live, fields.clone(), &context)
        .await;
    let mut first = cache
        .get_fields("platform:user:live:8")
        .await
        .unwrap()
        .unwrap();

    // a derived entry rebuilt by some reader between the two calls
    cache
        .upsert_fields(
            "platform:trade_stats:live:8",
            [("trades".to_string(), FieldValue::Integer(11))].into(),
        )
        .await
        .unwrap();

    coordinator
        .sync_user_after_change(UserId::new(8), UserType::Live, fields, &context)
        .await;
    let mut second = cache
        .get_fields("platform:user:live:8")
        .await
        .unwrap()
        .unwrap();

    // identical up to the freshness stamp, which tracks wall time
    first.remove(FRESHNESS_FIELD).unwrap();
    second.remove(FRESHNESS_FIELD).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        cache.get_scalar("platform:balance:live:8").await.unwrap(),
        Some(FieldValue::Decimal(amount))
    );
    assert!(cache
        .get_fields("platform:trade_stats:live:8")
        .await
        .unwrap()
        .is_none());
    assert_eq!(coordinator.step_failures(), 0);
}

#[tokio::test]
async fn test_successive_changes_accumulate_in_the_aggregate() {
    let cache = Arc::new(MemoryCache::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        cache.clone(),
        Arc::new(SyncEventBus::new()),
    ));

    coordinator
        .sync_user_after_change(
            UserId::new(3),
            UserType::Demo,
            deposit_fields(Decimal::new(500, 0)),
            &SyncContext::new(OperationType::WalletDeposit, "user-3", "wallet-service"),
        )
        .await;

    let mut order_fields = BTreeMap::new();
    order_fields.insert("open_positions".to_string(), FieldValue::Integer(3));
    order_fields.insert("last_order_side".to_string(), FieldValue::from("buy"));
    coordinator
        .sync_user_after_change(
            UserId::new(3),
            UserType::Demo,
            order_fields,
            &SyncContext::new(OperationType::OrderPlace, "user-3", "order-service"),
        )
        .await;

    let aggregate = cache
        .get_fields("platform:user:demo:3")
        .await
        .unwrap()
        .unwrap();
    // deposit fields survive the later order sync, overlapping ones move
    assert_eq!(
        aggregate[BALANCE_FIELD],
        FieldValue::Decimal(Decimal::new(500, 0))
    );
    assert_eq!(aggregate["open_positions"], FieldValue::Integer(3));
    assert_eq!(aggregate["last_order_side"], FieldValue::from("buy"));
}
