//! Test generation and execution.
//!
//! Two strictly separate phases:
//!
//! 1. **Register**: [`TestGenerator::register`] resolves every persona of a
//!    catalog against a [`ScenarioRequest`] and appends one [`TestGroup`] per
//!    persona to a [`TestPlan`]. Nothing touches the backend.
//! 2. **Execute**: [`TestPlan::execute`] runs the registered case bodies one
//!    at a time, in registration order, and returns a [`SuiteReport`].
//!
//! A persona that cannot be resolved produces a group carrying the error and
//! no cases; its siblings are registered normally.

use std::time::{Duration, Instant};

use rulecheck_core::{
    BackendCall, ExpectedOutcome, FeatureFlagContext, PersonaCatalog, ResolutionError,
    ResolvedCase, ScenarioMatrix, ScenarioRequest, SharedSession,
};
use rulecheck_testkit::{AssertionOutcome, expect_failure, expect_success};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{CaseResult, CaseStatus, RunLog, SuiteReport};

/// Default bound on a single case body.
pub const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(10);

/// A registered, not yet executed case.
#[derive(Clone)]
pub struct PlannedCase {
    pub case: ResolvedCase,
    pub call: BackendCall,
    session: SharedSession,
}

impl PlannedCase {
    /// Run the case body: issue the call once and check the outcome.
    async fn run(&self, timeout: Duration) -> (CaseStatus, String) {
        let pending = self.call.issue(self.session.as_ref());
        let expected = self.case.expected;
        let body = async move {
            match expected {
                ExpectedOutcome::Allowed => expect_success(pending).await,
                ExpectedOutcome::Denied => expect_failure(pending).await,
            }
        };

        match tokio::time::timeout(timeout, body).await {
            Ok(outcome @ AssertionOutcome::Passed) => (CaseStatus::Pass, outcome.message()),
            Ok(outcome @ AssertionOutcome::Mismatch { .. }) => {
                (CaseStatus::Fail, outcome.message())
            }
            Ok(outcome @ AssertionOutcome::BackendError { .. }) => {
                (CaseStatus::Error, outcome.message())
            }
            Err(_) => (
                CaseStatus::Error,
                format!("timed out after {}ms", timeout.as_millis()),
            ),
        }
    }
}

impl std::fmt::Debug for PlannedCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedCase")
            .field("case", &self.case)
            .field("call", &self.call)
            .finish_non_exhaustive()
    }
}

/// Cases registered for one persona on one collection.
#[derive(Debug, Clone)]
pub struct TestGroup {
    /// Group title: the persona label.
    pub title: String,
    pub collection: String,
    pub flags: FeatureFlagContext,
    /// Registered cases, or why the persona could not be resolved.
    pub cases: Result<Vec<PlannedCase>, ResolutionError>,
}

impl TestGroup {
    /// Number of registered cases (zero for an errored group).
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.cases.as_ref().map_or(0, Vec::len)
    }
}

/// Options for the execute phase.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Bound on each case body.
    pub case_timeout: Duration,
    /// Only run cases whose `"<group> <description>"` contains this string.
    pub filter: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            case_timeout: DEFAULT_CASE_TIMEOUT,
            filter: None,
        }
    }
}

impl ExecuteOptions {
    #[must_use]
    pub const fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn selects(&self, name: &str) -> bool {
        self.filter
            .as_deref()
            .is_none_or(|needle| name.contains(needle))
    }
}

/// Ordered set of registered test groups.
#[derive(Debug, Clone, Default)]
pub struct TestPlan {
    groups: Vec<TestGroup>,
}

impl TestPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn groups(&self) -> &[TestGroup] {
        &self.groups
    }

    /// Total registered cases across all groups.
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.groups.iter().map(TestGroup::case_count).sum()
    }

    /// Groups whose persona failed to resolve.
    pub fn registration_errors(&self) -> impl Iterator<Item = (&TestGroup, &ResolutionError)> {
        self.groups
            .iter()
            .filter_map(|group| group.cases.as_ref().err().map(|err| (group, err)))
    }

    /// Serializable outline of the plan: group titles and case descriptions.
    #[must_use]
    pub fn outline(&self) -> serde_json::Value {
        let groups: Vec<_> = self
            .groups
            .iter()
            .map(|group| {
                let body = match &group.cases {
                    Ok(cases) => json!({
                        "cases": cases.iter().map(|planned| &planned.case).collect::<Vec<_>>(),
                    }),
                    Err(err) => json!({ "error": err.to_string() }),
                };
                json!({
                    "title": group.title,
                    "collection": group.collection,
                    "public_dashboard": group.flags.state_name(),
                    "registration": body,
                })
            })
            .collect();
        json!({ "groups": groups, "case_count": self.case_count() })
    }

    /// Run every registered case in order.
    ///
    /// Each case issues its backend call exactly once; no case is retried and
    /// no failure stops the run.
    pub async fn execute(&self, options: &ExecuteOptions, log: &RunLog) -> SuiteReport {
        info!(
            groups = self.groups.len(),
            cases = self.case_count(),
            "executing test plan"
        );
        let mut report = SuiteReport::default();

        for group in &self.groups {
            let cases = match &group.cases {
                Ok(cases) => cases,
                Err(err) => {
                    report.record(CaseResult {
                        group: group.title.clone(),
                        collection: group.collection.clone(),
                        name: "registration".to_string(),
                        operation: None,
                        action: None,
                        expected: None,
                        status: CaseStatus::Error,
                        message: err.to_string(),
                        duration_ms: 0,
                    });
                    log.record(
                        "error",
                        "execute",
                        &group.title,
                        "registration",
                        CaseStatus::Error.as_str(),
                        0,
                        json!({ "collection": group.collection, "error": err.to_string() }),
                    );
                    continue;
                }
            };

            for planned in cases {
                let result = run_planned(group, planned, options).await;
                log.record(
                    level_for(result.status),
                    "execute",
                    &result.group,
                    &result.name,
                    result.status.as_str(),
                    result.duration_ms,
                    json!({
                        "collection": result.collection,
                        "operation": planned.case.operation,
                        "action": planned.case.action,
                        "document_id": planned.call.document_id,
                        "expected": planned.case.expected,
                        "message": result.message,
                    }),
                );
                report.record(result);
            }
        }

        info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            "test plan finished"
        );
        report
    }
}

async fn run_planned(group: &TestGroup, planned: &PlannedCase, options: &ExecuteOptions) -> CaseResult {
    let name = planned.case.description.clone();
    let mut result = CaseResult {
        group: group.title.clone(),
        collection: group.collection.clone(),
        name,
        operation: Some(planned.case.operation),
        action: Some(planned.case.action),
        expected: Some(planned.case.expected),
        status: CaseStatus::Skipped,
        message: "filtered out".to_string(),
        duration_ms: 0,
    };
    if !options.selects(&result.full_name()) {
        return result;
    }

    let start = Instant::now();
    let (status, message) = planned.run(options.case_timeout).await;
    result.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    result.status = status;
    result.message = message;

    match status {
        CaseStatus::Pass => debug!(group = %result.group, case = %result.name, "case passed"),
        _ => warn!(
            group = %result.group,
            case = %result.name,
            status = status.as_str(),
            message = %result.message,
            "case did not pass"
        ),
    }
    result
}

const fn level_for(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Pass | CaseStatus::Skipped => "info",
        CaseStatus::Fail => "warn",
        CaseStatus::Error => "error",
    }
}

/// Registers scenario cases for a persona catalog.
#[derive(Debug, Clone)]
pub struct TestGenerator {
    matrix: ScenarioMatrix,
    flags: FeatureFlagContext,
}

impl TestGenerator {
    /// Generator resolving with `matrix` under a fixed flag snapshot.
    #[must_use]
    pub const fn new(matrix: ScenarioMatrix, flags: FeatureFlagContext) -> Self {
        Self { matrix, flags }
    }

    #[must_use]
    pub const fn flags(&self) -> FeatureFlagContext {
        self.flags
    }

    /// Register one group per persona, in catalog order, for `request`.
    pub fn register(
        &self,
        plan: &mut TestPlan,
        personas: &PersonaCatalog,
        request: &ScenarioRequest,
        log: &RunLog,
    ) {
        for persona in personas {
            let cases = self
                .matrix
                .resolve(persona, request, self.flags)
                .map(|resolved| {
                    resolved
                        .into_iter()
                        .map(|case| PlannedCase {
                            call: case.call(request),
                            case,
                            session: persona.session().clone(),
                        })
                        .collect::<Vec<_>>()
                });

            match &cases {
                Ok(cases) => {
                    for planned in cases {
                        log.record(
                            "info",
                            "register",
                            persona.label(),
                            &planned.case.description,
                            "planned",
                            0,
                            json!({
                                "collection": request.collection,
                                "operation": planned.case.operation,
                                "expected": planned.case.expected,
                            }),
                        );
                    }
                }
                Err(err) => {
                    warn!(persona = persona.label(), collection = %request.collection, error = %err, "persona not registered");
                    log.record(
                        "error",
                        "register",
                        persona.label(),
                        "registration",
                        CaseStatus::Error.as_str(),
                        0,
                        json!({ "collection": request.collection, "error": err.to_string() }),
                    );
                }
            }

            plan.groups.push(TestGroup {
                title: persona.label().to_string(),
                collection: request.collection.clone(),
                flags: self.flags,
                cases,
            });
        }
    }

    /// Register every request, in order, into a fresh plan.
    #[must_use]
    pub fn plan(
        &self,
        personas: &PersonaCatalog,
        requests: &[ScenarioRequest],
        log: &RunLog,
    ) -> TestPlan {
        let mut plan = TestPlan::new();
        for request in requests {
            self.register(&mut plan, personas, request, log);
        }
        info!(
            requests = requests.len(),
            groups = plan.groups.len(),
            cases = plan.case_count(),
            flag = self.flags.state_name(),
            "registered test plan"
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use rulecheck_core::{
        Action, CapabilitySet, FlagSensitiveCollections, Operation, Persona,
    };
    use rulecheck_testkit::MemoryBackend;
    use serde_json::json;

    use super::*;

    fn generator(flag: bool) -> TestGenerator {
        TestGenerator::new(
            ScenarioMatrix::new(FlagSensitiveCollections::new(["build"])),
            FeatureFlagContext::new(flag),
        )
    }

    #[test]
    fn registration_does_not_touch_backend() {
        let backend = MemoryBackend::new();
        let personas = PersonaCatalog::default().with(Persona::gated(
            "anonymous",
            backend.session(None),
            CapabilitySet::new().with(Operation::Read, true),
            CapabilitySet::new(),
        ));

        let log = RunLog::new();
        let plan = generator(true).plan(
            &personas,
            &[ScenarioRequest::new("build").with_create(json!({}))],
            &log,
        );

        assert_eq!(plan.case_count(), 4);
        assert_eq!(backend.call_count(), 0);
        assert_eq!(log.for_phase("register").len(), 4);
    }

    #[test]
    fn errored_persona_does_not_block_siblings() {
        let backend = MemoryBackend::new();
        let personas = PersonaCatalog::default()
            .with(Persona::flat(
                "misdeclared",
                backend.session(None),
                CapabilitySet::new(),
            ))
            .with(Persona::gated(
                "owner",
                backend.session(Some("uid")),
                CapabilitySet::new(),
                CapabilitySet::new(),
            ));

        let plan = generator(false).plan(&personas, &[ScenarioRequest::new("build")], &RunLog::new());

        assert_eq!(plan.groups().len(), 2);
        assert_eq!(plan.registration_errors().count(), 1);
        assert_eq!(plan.groups()[1].case_count(), 2);
    }

    #[test]
    fn outline_lists_cases_per_group() {
        let backend = MemoryBackend::new();
        let personas = PersonaCatalog::default().with(Persona::gated(
            "owner",
            backend.session(Some("uid")),
            CapabilitySet::new().with(Operation::Update, true),
            CapabilitySet::new(),
        ));
        let plan = generator(true).plan(&personas, &[ScenarioRequest::new("build")], &RunLog::new());

        let outline = plan.outline();
        assert_eq!(outline["case_count"], 2);
        let group = &outline["groups"][0];
        assert_eq!(group["title"], "owner");
        assert_eq!(group["public_dashboard"], "on");
        assert_eq!(
            group["registration"]["cases"][0]["description"],
            "allows updating a document"
        );
        assert_eq!(group["registration"]["cases"][1]["action"], json!(Action::Delete));
    }

    #[test]
    fn filter_matches_group_and_description() {
        let options = ExecuteOptions::default().with_filter("owner allows");
        assert!(options.selects("owner allows updating a document"));
        assert!(!options.selects("stranger allows updating a document"));
        assert!(ExecuteOptions::default().selects("anything"));
    }
}
