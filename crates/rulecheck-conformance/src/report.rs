//! Per-case results and the aggregate suite report.

use std::fmt::Write as _;

use rulecheck_core::{Action, ExpectedOutcome, Operation};
use serde::{Deserialize, Serialize};

/// Outcome of one registered case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Backend outcome matched the expectation.
    Pass,
    /// Backend decided the other way.
    Fail,
    /// The case could not be judged (transport failure, timeout, or the
    /// persona could not be resolved).
    Error,
    /// Excluded by the name filter.
    Skipped,
}

impl CaseStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of a single case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    /// Test group title (the persona label).
    pub group: String,
    /// Collection under test.
    pub collection: String,
    /// Case description; `"registration"` for a persona that failed to resolve.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedOutcome>,
    pub status: CaseStatus,
    /// Human-readable detail.
    pub message: String,
    pub duration_ms: u64,
}

impl CaseResult {
    /// `"<group> <name>"`, the string the name filter matches against.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.group, self.name)
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Cases executed or skipped.
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    /// Every result, in registration order.
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    /// Record a result.
    pub fn record(&mut self, result: CaseResult) {
        self.total += 1;
        match result.status {
            CaseStatus::Pass => self.passed += 1,
            CaseStatus::Fail => self.failed += 1,
            CaseStatus::Error => self.errored += 1,
            CaseStatus::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: Self) {
        for result in other.results {
            self.record(result);
        }
    }

    /// Check if no case failed or errored.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Results that failed or errored.
    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, CaseStatus::Fail | CaseStatus::Error))
    }

    /// Grouped, indented text rendering.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut current: Option<(&str, &str)> = None;

        for result in &self.results {
            let key = (result.group.as_str(), result.collection.as_str());
            if current != Some(key) {
                let _ = writeln!(out, "{} [{}]", result.group, result.collection);
                current = Some(key);
            }
            let marker = match result.status {
                CaseStatus::Pass => "ok",
                CaseStatus::Fail => "FAIL",
                CaseStatus::Error => "ERROR",
                CaseStatus::Skipped => "skip",
            };
            let _ = write!(out, "  {marker:<5} {}", result.name);
            if matches!(result.status, CaseStatus::Fail | CaseStatus::Error) {
                let _ = write!(out, ": {}", result.message);
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "\n{} cases: {} passed, {} failed, {} errored, {} skipped",
            self.total, self.passed, self.failed, self.errored, self.skipped
        );
        out
    }
}
