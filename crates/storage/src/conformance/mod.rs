//! Conformance test suite for `ChainStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `ChainStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Items**: id allocation from 1, visibility after commit, abort
//! - **Participants**: per-role sequence allocation, overwrite, re-grant
//! - **Snapshot isolation**: uncommitted writes invisible, own writes visible
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **History**: transition records ordered, committed atomically with the item
//! - **Error handling**: correct error variants for missing records
//! - **Concurrency**: racing snapshots on one item, independent items
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use coldchain_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async { create_test_sqlite_storage().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod history;
mod items;
mod participants;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use coldchain_core::{ColdDrinkDraft, Identity, Role, Stage, Transition};

use crate::record::{ItemRecord, ParticipantRecord, TransitionRecord};
use crate::ChainStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "items", "snapshot", "version").
    pub category: String,
    /// Test name (e.g. "first_item_gets_id_1").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ChainStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(items::run_item_tests(&factory).await);
    results.extend(participants::run_participant_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(history::run_history_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn identity(name: &str) -> Identity {
    Identity::new(name).unwrap_or_else(|e| panic!("fixture identity '{name}': {e}"))
}

fn cola() -> ColdDrinkDraft {
    ColdDrinkDraft::new("Cola", "A refreshing soft drink", true)
}

/// Insert and commit one item, returning the committed record.
async fn seed_item<S: ChainStorage>(s: &S, draft: ColdDrinkDraft) -> Result<ItemRecord, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let rec = s
        .insert_item(&mut snap, draft)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit insert: {e}"))?;
    Ok(rec)
}

async fn seed_participant<S: ChainStorage>(
    s: &S,
    name: &str,
    role: Role,
) -> Result<ParticipantRecord, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let rec = s
        .put_participant(&mut snap, &identity(name), role)
        .await
        .map_err(|e| format!("put_participant: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit participant: {e}"))?;
    Ok(rec)
}

/// The record a backend would receive for `item`'s first transition.
fn make_transition(item_id: u64, transition: Transition, from_version: i64) -> TransitionRecord {
    TransitionRecord {
        item_id,
        transition,
        actor: identity("actor"),
        actor_sequence: 1,
        from_stage: transition.from(),
        to_stage: transition.to(),
        from_version,
        to_version: from_version + 1,
        recorded_at: "2025-01-01T00:00:00Z".to_string(),
        prev_digest: "0".repeat(64),
        digest: format!("{:064x}", item_id * 10 + from_version as u64),
    }
}

/// Move a stored item one stage forward without any authorization.
fn advanced(record: &ItemRecord) -> coldchain_core::ColdDrink {
    let mut item = record.item.clone();
    if let Some(next) = item.stage.next() {
        item.stage = next;
    }
    item
}

fn expect_stage(record: &ItemRecord, stage: Stage) -> Result<(), String> {
    if record.item.stage != stage {
        return Err(format!(
            "item {}: expected stage {stage}, got {}",
            record.item.id, record.item.stage
        ));
    }
    Ok(())
}
