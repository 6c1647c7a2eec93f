//! Assertion primitives driven through the in-memory backend.

use std::time::Duration;

use rulecheck_core::{Action, Operation};
use rulecheck_testkit::{
    AssertionOutcome, BackendSession, Fault, MemoryBackend, assert_completes_within, assert_fails,
    assert_succeeds, expect_failure, expect_success, fixtures, init_test_tracing,
};

#[tokio::test]
async fn owner_can_create_builds() {
    init_test_tracing();
    let backend = MemoryBackend::new().allow(Some(fixtures::user_uid()), "build", &[Operation::Create]);
    let owner = backend.session(Some(fixtures::user_uid()));
    let anonymous = backend.session(None);

    assert_succeeds(owner.create_document("build", &fixtures::build())).await;
    assert_fails(anonymous.create_document("build", &fixtures::build())).await;
}

#[tokio::test]
async fn read_grant_covers_query_and_get() {
    init_test_tracing();
    let backend = MemoryBackend::new().allow(None, "projects", &[Operation::Read]);
    let anonymous = backend.session(None);

    assert_succeeds(anonymous.read_collection("projects")).await;
    assert_succeeds(anonymous.get_document("projects", "1")).await;
    assert_fails(anonymous.delete_document("projects", "1")).await;
}

#[tokio::test]
async fn transport_error_satisfies_neither_expectation() {
    init_test_tracing();
    let backend = MemoryBackend::new().inject_fault(
        None,
        Action::Query,
        Fault::Transport("unreachable".into()),
    );
    let anonymous = backend.session(None);

    let failure = expect_failure(anonymous.read_collection("build")).await;
    assert!(matches!(failure, AssertionOutcome::BackendError { .. }));
    let success = expect_success(anonymous.read_collection("build")).await;
    assert!(matches!(success, AssertionOutcome::BackendError { .. }));
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn denial_where_success_expected_is_a_mismatch() {
    init_test_tracing();
    let anonymous = MemoryBackend::new().session(None);

    let outcome = expect_success(anonymous.update_document("build", "1", &fixtures::build())).await;
    assert!(matches!(outcome, AssertionOutcome::Mismatch { .. }));
    assert!(!outcome.is_passed());
}

#[tokio::test]
#[should_panic(expected = "Operation timed out")]
async fn hanging_operation_trips_the_deadline() {
    let backend = MemoryBackend::new().inject_fault(None, Action::Delete, Fault::Hang);
    let anonymous = backend.session(None);

    assert_completes_within(anonymous.delete_document("build", "1"), Duration::from_millis(20)).await;
}
