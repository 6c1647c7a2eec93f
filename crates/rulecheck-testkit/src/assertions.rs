//! Assertion primitives for pending backend operations.
//!
//! [`expect_success`] and [`expect_failure`] return an [`AssertionOutcome`]
//! so a runner can report each case. The `assert_*` variants panic instead,
//! for direct use inside `#[tokio::test]` bodies.

use std::future::Future;
use std::time::Duration;

use rulecheck_core::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};

/// What a pending operation turned out to be, relative to the expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssertionOutcome {
    /// Observed outcome matched the expectation.
    Passed,
    /// The backend decided, but the other way.
    Mismatch { expected: String, observed: String },
    /// The operation failed for a reason other than a rule decision.
    BackendError { error: BackendError },
}

impl AssertionOutcome {
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Short human-readable form.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Passed => "passed".to_string(),
            Self::Mismatch { expected, observed } => {
                format!("expected {expected} but the backend reported {observed}")
            }
            Self::BackendError { error } => error.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reporting primitives
// ─────────────────────────────────────────────────────────────────────────────

/// Await `pending` and check that the backend accepted it.
pub async fn expect_success<F>(pending: F) -> AssertionOutcome
where
    F: Future<Output = BackendResult>,
{
    match pending.await {
        Ok(()) => AssertionOutcome::Passed,
        Err(BackendError::Denied { message }) => AssertionOutcome::Mismatch {
            expected: "success".to_string(),
            observed: format!("denial ({message})"),
        },
        Err(error) => AssertionOutcome::BackendError { error },
    }
}

/// Await `pending` and check that the backend denied it.
///
/// Only a denial counts; a transport or malformed-request failure is reported
/// as [`AssertionOutcome::BackendError`], never as a pass.
pub async fn expect_failure<F>(pending: F) -> AssertionOutcome
where
    F: Future<Output = BackendResult>,
{
    match pending.await {
        Ok(()) => AssertionOutcome::Mismatch {
            expected: "denial".to_string(),
            observed: "success".to_string(),
        },
        Err(BackendError::Denied { .. }) => AssertionOutcome::Passed,
        Err(error) => AssertionOutcome::BackendError { error },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Panicking assertions
// ─────────────────────────────────────────────────────────────────────────────

/// Assert that the backend accepts `pending`.
///
/// # Panics
///
/// Panics if the operation is denied or fails.
pub async fn assert_succeeds<F>(pending: F)
where
    F: Future<Output = BackendResult>,
{
    let outcome = expect_success(pending).await;
    assert!(outcome.is_passed(), "Expected success: {}", outcome.message());
}

/// Assert that the backend denies `pending`.
///
/// # Panics
///
/// Panics if the operation succeeds or fails for another reason.
pub async fn assert_fails<F>(pending: F)
where
    F: Future<Output = BackendResult>,
{
    let outcome = expect_failure(pending).await;
    assert!(outcome.is_passed(), "Expected denial: {}", outcome.message());
}

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Assert that an async operation completes within a timeout.
///
/// # Panics
///
/// Panics if the operation times out.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
