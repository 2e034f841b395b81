//! Runs the backend-agnostic conformance suite against `MemoryStorage`.

use coldchain_storage::conformance::run_conformance_suite;
use coldchain_storage::MemoryStorage;

#[tokio::test]
async fn memory_storage_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total >= 30, "suite shrank unexpectedly: {report}");
}
