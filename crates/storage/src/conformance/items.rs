use std::future::Future;

use coldchain_core::{ColdDrinkDraft, Stage};

use super::{advanced, cola, seed_item, TestResult};
use crate::{ChainStorage, StorageError};

pub(super) async fn run_item_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "items",
        "first_item_gets_id_1",
        first_item_gets_id_1(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "ids_are_sequential",
        ids_are_sequential(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "new_item_created_at_version_0",
        new_item_created_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "insert_not_visible_before_commit",
        insert_not_visible_before_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "insert_not_visible_after_abort",
        insert_not_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "aborted_id_not_reused",
        aborted_id_not_reused(factory).await,
    ));
    results.push(TestResult::from_result(
        "items",
        "list_items_filters_by_stage",
        list_items_filters_by_stage(factory).await,
    ));

    results
}

async fn first_item_gets_id_1<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = seed_item(&s, cola()).await?;
    if rec.item.id != 1 {
        return Err(format!("expected id 1, got {}", rec.item.id));
    }
    let counter = s.item_counter().await.map_err(|e| e.to_string())?;
    if counter != 1 {
        return Err(format!("expected item counter 1, got {counter}"));
    }
    Ok(())
}

async fn ids_are_sequential<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for expected in 1..=5u64 {
        let rec = seed_item(&s, cola()).await?;
        if rec.item.id != expected {
            return Err(format!("expected id {expected}, got {}", rec.item.id));
        }
    }
    Ok(())
}

/// A fresh item is at `Created`, version 0, with no role ids and its
/// creation fields intact.
async fn new_item_created_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, ColdDrinkDraft::new("Lemonade", "Cloudy", false)).await?;
    let rec = s.get_item(1).await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    if rec.item.stage != Stage::Created {
        return Err(format!("expected Created, got {}", rec.item.stage));
    }
    if rec.item.name != "Lemonade" || rec.item.description != "Cloudy" {
        return Err(format!("creation fields altered: {:?}", rec.item));
    }
    if rec.item.ingredients_permitted {
        return Err("ingredients_permitted flipped to true".to_string());
    }
    if rec.item.supplier_id.is_some()
        || rec.item.manufacturer_id.is_some()
        || rec.item.distributor_id.is_some()
        || rec.item.retailer_id.is_some()
    {
        return Err("new item has a role id stamped".to_string());
    }
    Ok(())
}

async fn insert_not_visible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match s.get_item(rec.item.id).await {
        Err(StorageError::ItemNotFound { .. }) => {}
        Ok(_) => return Err("uncommitted item visible to get_item".to_string()),
        Err(e) => return Err(format!("unexpected error: {e}")),
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    s.get_item(rec.item.id)
        .await
        .map_err(|e| format!("committed item not visible: {e}"))?;
    Ok(())
}

async fn insert_not_visible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if s.get_item(rec.item.id).await.is_ok() {
        return Err("aborted item visible".to_string());
    }
    let listed = s.list_items(None).await.map_err(|e| e.to_string())?;
    if !listed.is_empty() {
        return Err(format!("expected no items, got {}", listed.len()));
    }
    Ok(())
}

async fn aborted_id_not_reused<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let burned = s
        .insert_item(&mut snap, cola())
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let next = seed_item(&s, cola()).await?;
    if next.item.id <= burned.item.id {
        return Err(format!(
            "id {} reused or went backwards after aborting id {}",
            next.item.id, burned.item.id
        ));
    }
    Ok(())
}

async fn list_items_filters_by_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, cola()).await?;
    let second = seed_item(&s, cola()).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_item(&mut snap, 0, &advanced(&second))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let created = s
        .list_items(Some(Stage::Created))
        .await
        .map_err(|e| e.to_string())?;
    let supplied = s
        .list_items(Some(Stage::RawMaterialSupply))
        .await
        .map_err(|e| e.to_string())?;
    let all = s.list_items(None).await.map_err(|e| e.to_string())?;

    if created.len() != 1 || created[0].item.id != 1 {
        return Err(format!("Created filter returned {created:?}"));
    }
    if supplied.len() != 1 || supplied[0].item.id != 2 {
        return Err(format!("RawMaterialSupply filter returned {supplied:?}"));
    }
    let ids: Vec<u64> = all.iter().map(|r| r.item.id).collect();
    if ids != vec![1, 2] {
        return Err(format!("expected ids [1, 2] in order, got {ids:?}"));
    }
    Ok(())
}
