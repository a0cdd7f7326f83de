//! Integration tests for ledger replication over the in-memory versioned store.

use paperbot::config::{RiskConfig, TradingParams};
use paperbot::services::{Ledger, MemoryStore, PushOutcome, Replicator, VersionedStore};
use paperbot::types::{ExitReason, LedgerState, PositionSide};
use std::sync::Arc;

const T0: i64 = 1_700_000_000_000;

fn traded_ledger() -> Ledger {
    let mut ledger = Ledger::in_memory(RiskConfig::default(), TradingParams::default(), T0);
    let position = ledger.engine().create(PositionSide::Long, 70_000.0, 500.0, T0);
    let id = position.id.clone();
    ledger.open_position(position).unwrap();
    ledger.close_position(&id, 70_080.0, ExitReason::TakeProfit, T0 + 60_000);
    ledger
}

async fn remote_state(store: &MemoryStore) -> LedgerState {
    let object = store.snapshot().await.unwrap();
    serde_json::from_slice(&object.content).unwrap()
}

#[tokio::test]
async fn test_conflict_then_success_writes_once() {
    let store = Arc::new(MemoryStore::new());
    let mut replicator = Replicator::new(store.clone());
    let ledger = traded_ledger();

    store.inject_conflicts(1).await;
    let outcome = replicator.push(ledger.state()).await.unwrap();

    assert!(matches!(outcome, PushOutcome::Pushed(_)));
    assert_eq!(store.writes().await, 1);
    assert_eq!(store.put_attempts().await, 2);
    assert_eq!(&remote_state(&store).await, ledger.state());
}

#[tokio::test]
async fn test_concurrent_writer_last_write_wins() {
    let store = Arc::new(MemoryStore::new());
    let mut first = Replicator::new(store.clone());
    let mut second = Replicator::new(store.clone());

    let fresh = LedgerState::new(2000.0, T0);
    first.push(&fresh).await.unwrap();

    // The second instance never pulled, so its create-only put conflicts,
    // refreshes the version and overwrites.
    let ledger = traded_ledger();
    let outcome = second.push(ledger.state()).await.unwrap();
    assert!(matches!(outcome, PushOutcome::Pushed(_)));
    assert_eq!(&remote_state(&store).await, ledger.state());

    // The first instance's cached version is now stale; it wins the next round.
    let mut later = fresh.clone();
    later.balance = 1_999.0;
    assert!(matches!(first.push(&later).await.unwrap(), PushOutcome::Pushed(_)));
    assert_eq!(remote_state(&store).await, later);
}

#[tokio::test]
async fn test_persistent_conflict_leaves_local_state() {
    let store = Arc::new(MemoryStore::new());
    let mut replicator = Replicator::new(store.clone());
    let ledger = traded_ledger();
    let before = ledger.state().clone();

    store.inject_conflicts(2).await;
    assert_eq!(
        replicator.push(ledger.state()).await.unwrap(),
        PushOutcome::Abandoned
    );
    assert_eq!(ledger.state(), &before);
    assert!(store.pull().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_replaces_local_state() {
    let store = Arc::new(MemoryStore::new());
    let remote = traded_ledger();
    Replicator::new(store.clone())
        .push(remote.state())
        .await
        .unwrap();
    assert_eq!(store.put_attempts().await, 1);

    // A new instance starts from an empty local ledger
    let mut local = Ledger::in_memory(RiskConfig::default(), TradingParams::default(), T0);
    let mut replicator = Replicator::new(store.clone());
    if let Some(state) = replicator.restore().await {
        local.replace_state(state);
    }

    assert_eq!(local.state(), remote.state());

    // The restored version is current, so the next push lands first try
    let outcome = replicator.push(local.state()).await.unwrap();
    assert!(matches!(outcome, PushOutcome::Pushed(_)));
    assert_eq!(store.put_attempts().await, 2);
    assert_eq!(store.writes().await, 2);
}

#[tokio::test]
async fn test_identical_push_repairs_drifted_remote() {
    let store = Arc::new(MemoryStore::new());
    let mut replicator = Replicator::new(store.clone());
    let ledger = traded_ledger();
    replicator.push(ledger.state()).await.unwrap();

    // Another writer replaces the object; local state has not changed
    store.external_write(b"{\"balance\":0}").await;
    let outcome = replicator.push(ledger.state()).await.unwrap();

    assert!(matches!(outcome, PushOutcome::Pushed(_)));
    assert_eq!(&remote_state(&store).await, ledger.state());
    // First put hits the stale version, the retry lands
    assert_eq!(store.put_attempts().await, 3);
}
