use std::future::Future;

use coldchain_core::{Role, Stage, Transition};

use super::{advanced, cola, expect_stage, identity, make_transition, seed_item, TestResult};
use crate::{ChainStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "update_increments_version",
        update_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_conflicts",
        stale_version_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "second_snapshot_loses_at_commit",
        second_snapshot_loses_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));

    results
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rec = seed_item(&s, cola()).await?;
    for expected in 1..=3i64 {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let v = s
            .update_item(&mut snap, rec.version, &advanced(&rec))
            .await
            .map_err(|e| e.to_string())?;
        if v != expected {
            return Err(format!("expected version {expected}, got {v}"));
        }
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        rec = s.get_item(1).await.map_err(|e| e.to_string())?;
    }
    expect_stage(&rec, Stage::Distribution)?;
    Ok(())
}

async fn stale_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = seed_item(&s, cola()).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut snap, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    match s.update_item(&mut snap, 0, &advanced(&rec)).await {
        Err(StorageError::ConcurrentConflict {
            item_id,
            expected_version,
        }) => {
            if item_id != 1 || expected_version != 0 {
                return Err(format!(
                    "conflict fields wrong: item {item_id}, expected_version {expected_version}"
                ));
            }
        }
        Ok(v) => return Err(format!("stale update succeeded with version {v}")),
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// Two snapshots read version 0 and both stage an update; the first to
/// commit wins and the second is rejected.
async fn second_snapshot_loses_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = seed_item(&s, cola()).await?;
    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut first, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    s.update_item(&mut second, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(first).await.map_err(|e| e.to_string())?;

    match s.commit_snapshot(second).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Ok(()) => return Err("second racing commit succeeded".to_string()),
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
    }
    let after = s.get_item(1).await.map_err(|e| e.to_string())?;
    if after.version != 1 {
        return Err(format!("expected version 1, got {}", after.version));
    }
    Ok(())
}

/// A commit rejected for a version conflict applies none of its other writes.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = seed_item(&s, cola()).await?;

    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut loser, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_transition(&mut loser, make_transition(1, Transition::SupplyRawMaterials, 0))
        .await
        .map_err(|e| e.to_string())?;
    s.put_participant(&mut loser, &identity("late"), Role::Retailer)
        .await
        .map_err(|e| e.to_string())?;

    let mut winner = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut winner, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(winner).await.map_err(|e| e.to_string())?;

    if s.commit_snapshot(loser).await.is_ok() {
        return Err("conflicting commit succeeded".to_string());
    }
    let history = s.list_transitions(1).await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("loser's transition leaked: {history:?}"));
    }
    if s.get_participant(&identity("late")).await.is_ok() {
        return Err("loser's participant leaked".to_string());
    }
    Ok(())
}
