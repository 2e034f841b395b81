use std::future::Future;

use coldchain_core::Transition;

use super::{advanced, cola, make_transition, seed_item, TestResult};
use crate::{ChainStorage, StorageError};

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "history",
        "transitions_listed_oldest_first",
        transitions_listed_oldest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "transition_invisible_until_commit",
        transition_invisible_until_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "latest_transition_sees_staged",
        latest_transition_sees_staged(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "transition_for_unknown_item_rejected",
        transition_for_unknown_item_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "history",
        "history_empty_for_unknown_item",
        history_empty_for_unknown_item(factory).await,
    ));

    results
}

async fn transitions_listed_oldest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut rec = seed_item(&s, cola()).await?;
    let steps = [Transition::SupplyRawMaterials, Transition::Manufacture];
    for (i, t) in steps.into_iter().enumerate() {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.update_item(&mut snap, i as i64, &advanced(&rec))
            .await
            .map_err(|e| e.to_string())?;
        s.insert_transition(&mut snap, make_transition(1, t, i as i64))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        rec = s.get_item(1).await.map_err(|e| e.to_string())?;
    }

    let history = s.list_transitions(1).await.map_err(|e| e.to_string())?;
    let got: Vec<Transition> = history.iter().map(|r| r.transition).collect();
    if got != steps.to_vec() {
        return Err(format!("expected {steps:?}, got {got:?}"));
    }
    Ok(())
}

async fn transition_invisible_until_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, cola()).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_transition(&mut snap, make_transition(1, Transition::SupplyRawMaterials, 0))
        .await
        .map_err(|e| e.to_string())?;
    if !s
        .list_transitions(1)
        .await
        .map_err(|e| e.to_string())?
        .is_empty()
    {
        return Err("staged transition visible before commit".to_string());
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if !s
        .list_transitions(1)
        .await
        .map_err(|e| e.to_string())?
        .is_empty()
    {
        return Err("aborted transition visible".to_string());
    }
    Ok(())
}

async fn latest_transition_sees_staged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_item(&s, cola()).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let none = s
        .latest_transition(&mut snap, 1)
        .await
        .map_err(|e| e.to_string())?;
    if none.is_some() {
        return Err("fresh item has a latest transition".to_string());
    }
    let staged = make_transition(1, Transition::SupplyRawMaterials, 0);
    s.insert_transition(&mut snap, staged.clone())
        .await
        .map_err(|e| e.to_string())?;
    let latest = s
        .latest_transition(&mut snap, 1)
        .await
        .map_err(|e| e.to_string())?;
    if latest.as_ref() != Some(&staged) {
        return Err(format!("expected staged record, got {latest:?}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn transition_for_unknown_item_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    match s
        .insert_transition(&mut snap, make_transition(42, Transition::SupplyRawMaterials, 0))
        .await
    {
        Err(StorageError::ItemNotFound { item_id: 42 }) => Ok(()),
        Ok(()) => Err("transition for unknown item accepted".to_string()),
        Err(e) => Err(format!("expected ItemNotFound, got {e}")),
    }
}

async fn history_empty_for_unknown_item<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let history = s.list_transitions(99).await.map_err(|e| e.to_string())?;
    if !history.is_empty() {
        return Err(format!("expected empty history, got {history:?}"));
    }
    Ok(())
}
