use std::future::Future;

use coldchain_core::ColdDrinkDraft;

use super::{cola, identity, TestResult};
use crate::{ChainStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_item_nonexistent",
        get_item_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_item_for_update_nonexistent",
        get_item_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_item_nonexistent",
        update_item_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_participant_nonexistent",
        get_participant_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "insert_invalid_draft_rejected",
        insert_invalid_draft_rejected(factory).await,
    ));

    results
}

async fn get_item_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_item(7).await {
        Err(StorageError::ItemNotFound { item_id: 7 }) => Ok(()),
        Ok(rec) => Err(format!("expected ItemNotFound, got {rec:?}")),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
    }
}

async fn get_item_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_item_for_update(&mut snap, 3).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::ItemNotFound { item_id: 3 }) => Ok(()),
        Ok(rec) => Err(format!("expected ItemNotFound, got {rec:?}")),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
    }
}

async fn update_item_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ghost = coldchain_core::ColdDrink::new(5, cola()).map_err(|e| e.to_string())?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.update_item(&mut snap, 0, &ghost).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::ItemNotFound { item_id: 5 }) => Ok(()),
        Ok(v) => Err(format!("update of unknown item returned version {v}")),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
    }
}

async fn get_participant_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_participant(&identity("0xnobody")).await {
        Err(StorageError::ParticipantNotFound { identity }) if identity == "0xnobody" => Ok(()),
        Ok(rec) => Err(format!("expected ParticipantNotFound, got {rec:?}")),
        Err(e) => Err(format!("expected ParticipantNotFound, got {e}")),
    }
}

async fn insert_invalid_draft_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_item(&mut snap, ColdDrinkDraft::new("", "no name", true))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::InvalidRecord { .. }) => Ok(()),
        Ok(rec) => Err(format!("invalid draft stored as {rec:?}")),
        Err(e) => Err(format!("expected InvalidRecord, got {e}")),
    }
}
