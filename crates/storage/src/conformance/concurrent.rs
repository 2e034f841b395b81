use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use coldchain_core::{ColdDrinkDraft, Role, Stage};

use super::{advanced, cola, expect_stage, identity, seed_item, TestResult};
use crate::{ChainStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "racing_transitions_exactly_one_wins",
        racing_transitions_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "different_items_all_succeed",
        different_items_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_get_distinct_ids",
        concurrent_inserts_get_distinct_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_registrations_get_distinct_sequences",
        concurrent_registrations_get_distinct_sequences(factory).await,
    ));

    results
}

// ── Racing on one item: exactly one wins ────────────────────────────────────

/// N tasks each advance the same item from version 0. Exactly one commit
/// succeeds; every other task sees ConcurrentConflict, either when staging
/// the update or when committing it.
async fn racing_transitions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let rec = seed_item(storage.as_ref(), cola()).await?;
    let next = advanced(&rec);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let next = next.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.update_item(&mut snap, 0, &next).await {
                Ok(_) => {}
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    return Ok(false);
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            }
            match s.commit_snapshot(snap).await {
                Ok(()) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let after = storage.get_item(1).await.map_err(|e| e.to_string())?;
    expect_stage(&after, Stage::RawMaterialSupply)?;
    if after.version != 1 {
        return Err(format!("expected final version 1, got {}", after.version));
    }
    Ok(())
}

// ── Different items: no false conflicts ─────────────────────────────────────

async fn different_items_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut records = Vec::new();
    for i in 0..N {
        let draft = ColdDrinkDraft::new(format!("Drink {i}"), "batch item", true);
        records.push(seed_item(storage.as_ref(), draft).await?);
    }

    let mut handles = Vec::new();
    for rec in records {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            s.update_item(&mut snap, rec.version, &advanced(&rec)).await?;
            s.commit_snapshot(snap).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("independent update failed: {e}"))?;
    }

    let advanced_items = storage
        .list_items(Some(Stage::RawMaterialSupply))
        .await
        .map_err(|e| e.to_string())?;
    if advanced_items.len() != N {
        return Err(format!(
            "expected {N} advanced items, got {}",
            advanced_items.len()
        ));
    }
    Ok(())
}

// ── Counters under contention ───────────────────────────────────────────────

async fn concurrent_inserts_get_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let rec = s
                .insert_item(&mut snap, ColdDrinkDraft::new(format!("Drink {i}"), "racing", true))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<u64, StorageError>(rec.item.id)
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("insert failed: {e}"))?;
        ids.insert(id);
    }
    let expected: BTreeSet<u64> = (1..=N as u64).collect();
    if ids != expected {
        return Err(format!("expected ids 1..={N}, got {ids:?}"));
    }
    Ok(())
}

async fn concurrent_registrations_get_distinct_sequences<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let rec = s
                .put_participant(&mut snap, &identity(&format!("dist-{i}")), Role::Distributor)
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<u64, StorageError>(rec.sequence)
        }));
    }

    let mut sequences = BTreeSet::new();
    for handle in handles {
        let seq = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("registration failed: {e}"))?;
        sequences.insert(seq);
    }
    let expected: BTreeSet<u64> = (1..=N as u64).collect();
    if sequences != expected {
        return Err(format!("expected sequences 1..={N}, got {sequences:?}"));
    }
    Ok(())
}
