//! Conformance test suite for `AdoptionStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `AdoptionStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Initialization**: pet insertion, duplicate detection
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: pet update and adoption insert land together or not at all
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Unique adoption**: at most one adoption fact per pet
//! - **Sweep queries**: candidate selection for the escalation sweeps
//! - **Concurrency**: racing writers and row-lock serialization
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use adopet_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod init;
mod snapshot;
mod sweep;
mod version;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::{AdoptionRecord, PetRecord, PetStatus};
use crate::AdoptionStorage;

/// Reference instant used by every fixture.
const T0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_pet_starts_at_version_0").
    pub name: String,
    /// Whether the test passed.
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
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(sweep::run_sweep_tests(&factory).await);
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

// ── Helpers: record constructors and seeding ─────────────────────────────────

fn make_pet(id: &str, owner_id: &str) -> PetRecord {
    PetRecord::listed(id, owner_id, format!("pet {id}"), T0)
}

/// A pet whose adopter self-confirmed, nominated at `marked_at`.
fn make_awaiting_pet(id: &str, adopter_id: &str, marked_at: OffsetDateTime) -> PetRecord {
    let mut pet = make_pet(id, "tutor-1");
    pet.status = PetStatus::Adopted;
    pet.pending_adopter_id = Some(adopter_id.to_string());
    pet.marked_adopted_at = Some(marked_at);
    pet.adopter_confirmed_at = Some(marked_at + time::Duration::hours(1));
    pet
}

fn make_adoption(pet_id: &str, adopter_id: &str, adopted_at: OffsetDateTime) -> AdoptionRecord {
    AdoptionRecord {
        id: AdoptionRecord::id_for_pet(pet_id),
        pet_id: pet_id.to_string(),
        tutor_id: "tutor-1".to_string(),
        adopter_id: adopter_id.to_string(),
        adopted_at,
    }
}

/// Insert and commit the given pets in one snapshot.
async fn seed<S: AdoptionStorage>(storage: &S, pets: Vec<PetRecord>) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    for pet in pets {
        storage
            .insert_pet(&mut snap, pet)
            .await
            .map_err(|e| format!("insert_pet: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Insert and commit an adoption fact.
async fn seed_adoption<S: AdoptionStorage>(
    storage: &S,
    record: AdoptionRecord,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_adoption(&mut snap, record)
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit adoption: {e}"))
}
