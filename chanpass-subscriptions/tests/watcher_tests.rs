//! Background watcher tests
//!
//! Run on a paused tokio clock so sweep intervals elapse instantly.

use async_trait::async_trait;
use chanpass_subscriptions::storage::Result as StoreResult;
use chanpass_subscriptions::testing::MockPlatform;
use chanpass_subscriptions::{
    ChannelConfig, ChatId, ManualClock, MemberStatus, MembershipReconciler,
    MemorySubscriptionStore, RecordUpdate, StorageError, SubscriptionRecord, SubscriptionStore,
    SubscriptionWatcher, UserId, WatcherConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const NOW: i64 = 1_700_000_000;

/// Store whose first `failures` snapshots fail
struct FlakyStore {
    inner: MemorySubscriptionStore,
    failures: AtomicUsize,
}

#[async_trait]
impl SubscriptionStore for FlakyStore {
    async fn get(&self, user_id: UserId) -> StoreResult<Option<SubscriptionRecord>> {
        self.inner.get(user_id).await
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> StoreResult<()> {
        self.inner.upsert(record).await
    }

    async fn delete(&self, user_id: UserId) -> StoreResult<bool> {
        self.inner.delete(user_id).await
    }

    async fn list_all(&self) -> StoreResult<Vec<SubscriptionRecord>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Unavailable("database is locked".to_string()));
        }
        self.inner.list_all().await
    }

    async fn update(
        &self,
        user_id: UserId,
        f: RecordUpdate,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        self.inner.update(user_id, f).await
    }
}

fn watcher_over(store: Arc<dyn SubscriptionStore>, platform: &MockPlatform) -> SubscriptionWatcher {
    let reconciler = MembershipReconciler::new(
        store,
        Arc::new(platform.clone()),
        ChannelConfig::new(ChatId(-1001), UserId(1)),
        Arc::new(ManualClock::new(NOW)),
    );
    SubscriptionWatcher::new(
        Arc::new(reconciler),
        WatcherConfig::default().with_interval_secs(60),
    )
}

#[tokio::test(start_paused = true)]
async fn test_watcher_sweeps_on_interval() {
    let store = MemorySubscriptionStore::with_records([SubscriptionRecord::new(UserId(10), NOW - 1)]);
    let platform = MockPlatform::new().with_default_status(MemberStatus::Member);
    let (tx, rx) = watch::channel(false);

    let handle = watcher_over(Arc::new(store.clone()), &platform).spawn(rx);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(store.list_all().await.unwrap().is_empty());
    assert_eq!(platform.bans_of(UserId(10)), 1);

    // Lands between sweeps, picked up by the next one
    store
        .upsert(&SubscriptionRecord::new(UserId(20), NOW - 1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.list_all().await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(store.list_all().await.unwrap().is_empty());
    assert_eq!(platform.bans_of(UserId(20)), 1);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_watcher_survives_storage_failure() {
    let store = Arc::new(FlakyStore {
        inner: MemorySubscriptionStore::with_records([SubscriptionRecord::new(UserId(10), NOW - 1)]),
        failures: AtomicUsize::new(1),
    });
    let platform = MockPlatform::new();
    let (tx, rx) = watch::channel(false);

    let handle = watcher_over(store.clone(), &platform).spawn(rx);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.inner.list_all().await.unwrap().len(), 1);
    assert!(!handle.is_finished());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(store.inner.list_all().await.unwrap().is_empty());

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_watcher_stops_when_sender_dropped() {
    let store = MemorySubscriptionStore::new();
    let platform = MockPlatform::new();
    let (tx, rx) = watch::channel(false);

    let handle = watcher_over(Arc::new(store), &platform).spawn(rx);
    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_interval_wait() {
    let store = MemorySubscriptionStore::new();
    let platform = MockPlatform::new();
    let (tx, rx) = watch::channel(false);

    let handle = watcher_over(Arc::new(store), &platform).spawn(rx);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let started = tokio::time::Instant::now();
    tx.send(true).unwrap();
    handle.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_sweep_paces_platform_traffic() {
    let store = MemorySubscriptionStore::with_records(
        (1..=3).map(|i| SubscriptionRecord::new(UserId(i), NOW - 1)),
    );
    let platform = MockPlatform::new().with_default_status(MemberStatus::Member);
    let reconciler = MembershipReconciler::new(
        Arc::new(store.clone()),
        Arc::new(platform.clone()),
        ChannelConfig::new(ChatId(-1001), UserId(1)),
        Arc::new(ManualClock::new(NOW)),
    );
    let watcher = SubscriptionWatcher::new(
        Arc::new(reconciler),
        WatcherConfig::default().with_pace_ms(20),
    );

    let started = std::time::Instant::now();
    let report = watcher.sweep_once().await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.evicted, 3);
    assert!(started.elapsed() >= Duration::from_millis(60));
}
