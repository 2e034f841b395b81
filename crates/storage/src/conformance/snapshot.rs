use std::future::Future;

use coldchain_core::Stage;

use super::{advanced, cola, expect_stage, seed_item, TestResult};
use crate::ChainStorage;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "update_not_visible_before_commit",
        update_not_visible_before_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "own_update_visible_for_update",
        own_update_visible_for_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_update",
        abort_discards_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "insert_then_update_in_one_snapshot",
        insert_then_update_in_one_snapshot(factory).await,
    ));

    results
}

async fn update_not_visible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let outside = s.get_item(1).await.map_err(|e| e.to_string())?;
    expect_stage(&outside, Stage::Created)?;
    if outside.version != 0 {
        return Err(format!("uncommitted version leaked: {}", outside.version));
    }

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let after = s.get_item(1).await.map_err(|e| e.to_string())?;
    expect_stage(&after, Stage::RawMaterialSupply)?;
    if after.version != 1 {
        return Err(format!("expected version 1 after commit, got {}", after.version));
    }
    Ok(())
}

/// Reads inside the snapshot see its own staged writes.
async fn own_update_visible_for_update<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let inside = s
        .get_item_for_update(&mut snap, 1)
        .await
        .map_err(|e| e.to_string())?;
    expect_stage(&inside, Stage::RawMaterialSupply)?;
    if inside.version != 1 {
        return Err(format!("expected staged version 1, got {}", inside.version));
    }

    // A second update chains from the staged version.
    s.update_item(&mut snap, 1, &advanced(&inside))
        .await
        .map_err(|e| format!("chained update: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let after = s.get_item(1).await.map_err(|e| e.to_string())?;
    expect_stage(&after, Stage::Manufacture)?;
    Ok(())
}

async fn abort_discards_update<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let after = s.get_item(1).await.map_err(|e| e.to_string())?;
    expect_stage(&after, Stage::Created)?;

    // The item is still updatable from version 0.
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut snap, 0, &advanced(&after))
        .await
        .map_err(|e| format!("update after abort: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn insert_then_update_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rec = s
        .insert_item(&mut snap, cola())
        .await
        .map_err(|e| e.to_string())?;
    let version = s
        .update_item(&mut snap, 0, &advanced(&rec))
        .await
        .map_err(|e| e.to_string())?;
    if version != 1 {
        return Err(format!("expected version 1, got {version}"));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let after = s.get_item(rec.item.id).await.map_err(|e| e.to_string())?;
    expect_stage(&after, Stage::RawMaterialSupply)?;
    Ok(())
}
