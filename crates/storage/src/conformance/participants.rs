use std::future::Future;

use coldchain_core::Role;

use super::{identity, seed_participant, TestResult};
use crate::{ChainStorage, StorageError};

pub(super) async fn run_participant_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "participants",
        "first_of_role_gets_sequence_1",
        first_of_role_gets_sequence_1(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "sequences_independent_per_role",
        sequences_independent_per_role(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "re_adding_same_role_keeps_sequence",
        re_adding_same_role_keeps_sequence(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "overwrite_changes_role",
        overwrite_changes_role(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "regrant_reuses_original_sequence",
        regrant_reuses_original_sequence(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "participant_not_visible_before_commit",
        participant_not_visible_before_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "list_participants_filters_by_role",
        list_participants_filters_by_role(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "read_for_update_sees_staged_grant",
        read_for_update_sees_staged_grant(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "role_change_after_read_conflicts",
        role_change_after_read_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "participants",
        "unchanged_role_after_read_commits",
        unchanged_role_after_read_commits(factory).await,
    ));

    results
}

async fn first_of_role_gets_sequence_1<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = seed_participant(&s, "rms", Role::RawMaterialSupplier).await?;
    if rec.sequence != 1 {
        return Err(format!("expected sequence 1, got {}", rec.sequence));
    }
    let stored = s
        .get_participant(&identity("rms"))
        .await
        .map_err(|e| e.to_string())?;
    if stored.role != Role::RawMaterialSupplier || stored.sequence != 1 {
        return Err(format!("stored record mismatch: {stored:?}"));
    }
    Ok(())
}

async fn sequences_independent_per_role<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let r1 = seed_participant(&s, "r1", Role::Retailer).await?;
    let m1 = seed_participant(&s, "m1", Role::Manufacturer).await?;
    let r2 = seed_participant(&s, "r2", Role::Retailer).await?;
    let d1 = seed_participant(&s, "d1", Role::Distributor).await?;
    let got = (r1.sequence, m1.sequence, r2.sequence, d1.sequence);
    if got != (1, 1, 2, 1) {
        return Err(format!("expected sequences (1, 1, 2, 1), got {got:?}"));
    }
    Ok(())
}

async fn re_adding_same_role_keeps_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "r1", Role::Retailer).await?;
    let again = seed_participant(&s, "r1", Role::Retailer).await?;
    if again.sequence != 1 {
        return Err(format!("expected sequence 1 kept, got {}", again.sequence));
    }
    let r2 = seed_participant(&s, "r2", Role::Retailer).await?;
    if r2.sequence != 2 {
        return Err(format!(
            "re-adding consumed a sequence: next retailer got {}",
            r2.sequence
        ));
    }
    Ok(())
}

async fn overwrite_changes_role<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "x", Role::Manufacturer).await?;
    seed_participant(&s, "x", Role::Distributor).await?;
    let rec = s
        .get_participant(&identity("x"))
        .await
        .map_err(|e| e.to_string())?;
    if rec.role != Role::Distributor {
        return Err(format!("expected Distributor after overwrite, got {}", rec.role));
    }
    if rec.sequences.get(&Role::Manufacturer) != Some(&1) {
        return Err(format!("earlier sequence lost: {:?}", rec.sequences));
    }
    Ok(())
}

async fn regrant_reuses_original_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "x", Role::Retailer).await?;
    seed_participant(&s, "y", Role::Retailer).await?;
    seed_participant(&s, "x", Role::Manufacturer).await?;
    let back = seed_participant(&s, "x", Role::Retailer).await?;
    if back.sequence != 1 {
        return Err(format!("expected original sequence 1, got {}", back.sequence));
    }
    Ok(())
}

async fn participant_not_visible_before_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.put_participant(&mut snap, &identity("d"), Role::Distributor)
        .await
        .map_err(|e| e.to_string())?;
    match s.get_participant(&identity("d")).await {
        Err(StorageError::ParticipantNotFound { .. }) => {}
        Ok(_) => return Err("uncommitted participant visible".to_string()),
        Err(e) => return Err(format!("unexpected error: {e}")),
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    s.get_participant(&identity("d"))
        .await
        .map_err(|e| format!("committed participant not visible: {e}"))?;
    Ok(())
}

async fn list_participants_filters_by_role<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "r1", Role::Retailer).await?;
    seed_participant(&s, "m1", Role::Manufacturer).await?;
    seed_participant(&s, "r2", Role::Retailer).await?;

    let retailers = s
        .list_participants(Some(Role::Retailer))
        .await
        .map_err(|e| e.to_string())?;
    if retailers.len() != 2 || retailers.iter().any(|p| p.role != Role::Retailer) {
        return Err(format!("retailer filter returned {retailers:?}"));
    }
    let all = s.list_participants(None).await.map_err(|e| e.to_string())?;
    if all.len() != 3 {
        return Err(format!("expected 3 participants, got {}", all.len()));
    }
    Ok(())
}

async fn read_for_update_sees_staged_grant<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "x", Role::Distributor).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.put_participant(&mut snap, &identity("x"), Role::Retailer)
        .await
        .map_err(|e| e.to_string())?;
    let seen = s
        .get_participant_for_update(&mut snap, &identity("x"))
        .await
        .map_err(|e| e.to_string())?;
    match seen {
        Some(rec) if rec.role == Role::Retailer && rec.sequences.len() == 2 => {}
        other => return Err(format!("expected staged Retailer grant, got {other:?}")),
    }
    let unknown = s
        .get_participant_for_update(&mut snap, &identity("nobody"))
        .await
        .map_err(|e| e.to_string())?;
    if unknown.is_some() {
        return Err(format!("unregistered identity read as {unknown:?}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn role_change_after_read_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut reader = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let seen = s
        .get_participant_for_update(&mut reader, &identity("x"))
        .await
        .map_err(|e| e.to_string())?;
    if seen.is_some() {
        return Err(format!("fresh identity read as {seen:?}"));
    }
    s.put_participant(&mut reader, &identity("x"), Role::Retailer)
        .await
        .map_err(|e| e.to_string())?;

    seed_participant(&s, "x", Role::Distributor).await?;

    match s.commit_snapshot(reader).await {
        Err(StorageError::RoleConflict { identity: who }) if who == "x" => {}
        Ok(()) => return Err("commit succeeded over a concurrent role change".to_string()),
        Err(e) => return Err(format!("expected RoleConflict, got {e}")),
    }
    let stored = s
        .get_participant(&identity("x"))
        .await
        .map_err(|e| e.to_string())?;
    if stored.role != Role::Distributor {
        return Err(format!("losing grant leaked: role is {}", stored.role));
    }
    Ok(())
}

async fn unchanged_role_after_read_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_participant(&s, "x", Role::Manufacturer).await?;

    let mut reader = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.get_participant_for_update(&mut reader, &identity("x"))
        .await
        .map_err(|e| e.to_string())?;
    // A grant of some other identity does not disturb the read.
    seed_participant(&s, "y", Role::Manufacturer).await?;
    s.commit_snapshot(reader)
        .await
        .map_err(|e| format!("commit after unrelated grant: {e}"))
}
