/*
    sync_properties.rs - Drain guarantees of the sync manager

    Each test records actions while offline, brings the manager online and
    checks what reached the remote store and what is left in the queue.
*/

use async_trait::async_trait;
use chrono::FixedOffset;
use coachsync_core::model::{ActionId, ActionPayload, OfflineAction};
use coachsync_core::queue::{
    ActionQueueStore, MemoryActionStore, QuarantinedAction, SqlActionStore, StorageError,
    StorageResult,
};
use coachsync_core::remote::{InMemoryRemoteStore, RemoteOp};
use coachsync_core::sync::{SkipReason, SyncManager, SyncOutcome, SyncSettings};
use coachsync_core::test_utils::{
    custom_meal_action, custom_meal_then_log, meal_log_action, test_date, wait_for,
    weight_action, DEFAULT_TEST_TIMEOUT,
};
use coachsync_core::HandlerRegistry;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn manager_for(store: Arc<dyn ActionQueueStore>, remote: Arc<InMemoryRemoteStore>) -> Arc<SyncManager> {
    let registry = HandlerRegistry::with_defaults(remote, FixedOffset::east_opt(0).unwrap());
    Arc::new(SyncManager::new(store, registry, SyncSettings::default()))
}

/// Queue whose first `failures` removals fail, as if the process died
/// between the remote write and the local delete
struct CrashBeforeRemove {
    inner: MemoryActionStore,
    failures: AtomicUsize,
}

impl CrashBeforeRemove {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryActionStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ActionQueueStore for CrashBeforeRemove {
    async fn enqueue(&self, action: &OfflineAction) -> StorageResult<()> {
        self.inner.enqueue(action).await
    }

    async fn get_pending_actions(&self) -> StorageResult<Vec<OfflineAction>> {
        self.inner.get_pending_actions().await
    }

    async fn remove_action(&self, id: &ActionId) -> StorageResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Database("disk I/O error".to_string()));
        }
        self.inner.remove_action(id).await
    }

    async fn quarantine_action(&self, id: &ActionId, reason: &str) -> StorageResult<()> {
        self.inner.quarantine_action(id, reason).await
    }

    async fn get_quarantined_actions(&self) -> StorageResult<Vec<QuarantinedAction>> {
        self.inner.get_quarantined_actions().await
    }

    async fn requeue_quarantined(&self, id: &ActionId) -> StorageResult<bool> {
        self.inner.requeue_quarantined(id).await
    }
}

fn action_strategy() -> impl Strategy<Value = OfflineAction> {
    prop_oneof![
        (30.0..250.0f64).prop_map(|v| weight_action("u1", v)),
        (0..5u8, any::<bool>())
            .prop_map(|(item, consumed)| meal_log_action("u1", &format!("item-{}", item), consumed)),
        "[A-Za-z]{1,12}".prop_map(|name| custom_meal_action("u1", "plan-1", &name)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_offline_enqueues_drain_to_empty(actions in prop::collection::vec(action_strategy(), 0..20)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let store = Arc::new(SqlActionStore::memory().unwrap());
            let remote = Arc::new(InMemoryRemoteStore::new());
            let manager = manager_for(store.clone(), remote.clone());

            for action in &actions {
                store.enqueue(action).await.unwrap();
                assert!(manager.sync().await.is_skipped());
            }
            assert_eq!(store.pending_count().await.unwrap(), actions.len());

            manager.set_online(true);
            let outcome = manager.sync().await;

            let report = outcome.report().unwrap();
            assert_eq!(report.attempted, actions.len());
            assert_eq!(report.remaining(), 0);
            assert_eq!(store.pending_count().await.unwrap(), 0);
        });
    }
}

#[tokio::test]
async fn test_custom_meal_replay_after_crash_creates_one_record() {
    let store = Arc::new(CrashBeforeRemove::new(1));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = manager_for(store.clone(), remote.clone());
    let action = custom_meal_action("u1", "plan-1", "Overnight oats");
    let plan = match &action.payload {
        ActionPayload::AddCustomMeal(p) => p.meal_plan_id.clone(),
        _ => unreachable!(),
    };
    store.enqueue(&action).await.unwrap();
    manager.set_online(true);

    // Remote write succeeds, local removal does not
    let first = manager.sync().await;
    assert_eq!(first.report().unwrap().deferred, 1);
    assert_eq!(store.pending_count().await.unwrap(), 1);

    let second = manager.sync().await;
    assert_eq!(second.report().unwrap().already_applied, 1);
    assert_eq!(store.pending_count().await.unwrap(), 0);

    assert_eq!(remote.meals().len(), 1);
    assert_eq!(remote.plan_members(&plan).len(), 1);
}

#[tokio::test]
async fn test_meal_is_created_before_its_log() {
    let store = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = manager_for(store.clone(), remote.clone());
    let (create, log) = custom_meal_then_log("u1", "plan-1");
    store.enqueue(&create).await.unwrap();
    store.enqueue(&log).await.unwrap();
    manager.set_online(true);

    let report = manager.sync().await.report().cloned().unwrap();
    assert_eq!(report.applied, 2);

    let calls = remote.calls();
    let meal_insert = calls.iter().position(|op| *op == RemoteOp::InsertMeal).unwrap();
    let log_insert = calls
        .iter()
        .position(|op| *op == RemoteOp::InsertMealLog)
        .unwrap();
    assert!(meal_insert < log_insert);
}

#[tokio::test]
async fn test_failed_action_stays_while_later_one_is_removed() {
    let store = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = manager_for(store.clone(), remote.clone());
    let a = custom_meal_action("u1", "plan-1", "Shakshuka");
    let b = weight_action("u1", 79.4);
    store.enqueue(&a).await.unwrap();
    store.enqueue(&b).await.unwrap();
    remote.inject_failure(
        RemoteOp::InsertMeal,
        1,
        coachsync_core::remote::RemoteError::Unavailable("connection reset".into()),
    );
    manager.set_online(true);

    manager.sync().await;

    let pending: Vec<_> = store
        .get_pending_actions()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(pending, vec![a.id]);
    assert_eq!(remote.weights().len(), 1);
}

#[tokio::test]
async fn test_rapid_second_sync_is_noop() {
    let store = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.set_latency(Some(Duration::from_millis(50)));
    let manager = manager_for(store.clone(), remote.clone());
    store.enqueue(&weight_action("u1", 80.0)).await.unwrap();
    store.enqueue(&weight_action("u1", 80.5)).await.unwrap();
    manager.set_online(true);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.sync().await }
    });
    let probe = manager.clone();
    wait_for(DEFAULT_TEST_TIMEOUT, move || {
        let probe = probe.clone();
        async move { probe.is_syncing() }
    })
    .await
    .unwrap();

    assert_eq!(
        manager.sync().await,
        SyncOutcome::skipped(SkipReason::AlreadySyncing)
    );

    let report = first.await.unwrap().report().cloned().unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(remote.weights().len(), 2);
}

#[tokio::test]
async fn test_weight_scenario_one_record_empty_queue() {
    let store = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = manager_for(store.clone(), remote.clone());
    let action = weight_action("u1", 82.5);
    store.enqueue(&action).await.unwrap();
    manager.set_online(true);

    manager.sync().await;

    let weights = remote.weights();
    assert_eq!(weights.len(), 1);
    assert_eq!(weights[0].value, 82.5);
    assert_eq!(weights[0].date, test_date());
    assert_eq!(weights[0].user_id.as_str(), "u1");
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unconsumed_meal_without_log_is_removed_without_writes() {
    let store = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let manager = manager_for(store.clone(), remote.clone());
    store
        .enqueue(&meal_log_action("u1", "item-3", false))
        .await
        .unwrap();
    manager.set_online(true);

    let report = manager.sync().await.report().cloned().unwrap();

    assert_eq!(report.already_applied, 1);
    assert_eq!(remote.mutation_count(), 0);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}
