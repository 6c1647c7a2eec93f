//! Emulator REST session and end-to-end suite runs against a mock emulator.

use std::io::Write as _;

use rulecheck_conformance::{
    AuthClaims, ConfigError, EmulatorSession, RunLog, SuiteConfig, plan_suite, run_suite,
};
use rulecheck_core::{BackendError, BackendSession};
use rulecheck_testkit::{
    MockEmulatorServer, bearer_subject, fixtures, init_test_tracing,
    init_test_tracing_with_filter,
};
use serde_json::json;

const PROJECT: &str = "rules-spec";

fn session(server: &MockEmulatorServer, auth: Option<&AuthClaims>) -> EmulatorSession {
    EmulatorSession::new(
        reqwest::Client::new(),
        &server.base_url(),
        server.project_id(),
        auth,
    )
}

fn signed_in(server: &MockEmulatorServer) -> EmulatorSession {
    let claims = AuthClaims::from_user(&fixtures::user()).unwrap();
    session(server, Some(&claims))
}

fn commit_body(request: &wiremock::Request) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn id_token_selects_identity() {
    init_test_tracing_with_filter("info,rulecheck_conformance=trace");
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow_for_uid("GET", "build", None, fixtures::user_uid()).await;
    server.deny("GET", "build", None).await;

    assert_eq!(signed_in(&server).read_collection("build").await, Ok(()));
    let stranger = AuthClaims::new("someone-else");
    let denied = session(&server, Some(&stranger))
        .read_collection("build")
        .await
        .unwrap_err();
    assert!(denied.is_denial(), "{denied:?}");
    let denied = session(&server, None).read_collection("build").await.unwrap_err();
    assert!(denied.is_denial(), "{denied:?}");

    let requests = server.received_requests().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(bearer_subject(&requests[0]).as_deref(), Some("uid"));
    assert!(requests[2].headers.get("authorization").is_none());
}

#[tokio::test]
async fn bearer_is_never_the_admin_credential() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow("GET", "build", None).await;

    signed_in(&server).read_collection("build").await.unwrap();

    let requests = server.received_requests().await;
    let header = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert_ne!(header, "Bearer owner");
    let token = header.strip_prefix("Bearer ").unwrap();
    assert_eq!(token.split('.').count(), 3);
    assert!(token.ends_with('.'), "unsigned token carries an empty signature");
}

#[tokio::test]
async fn create_posts_typed_fields() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow("POST", "build", None).await;

    signed_in(&server)
        .create_document("build", &fixtures::build())
        .await
        .unwrap();

    let requests = server.received_requests().await;
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["fields"]["projectId"], json!({"stringValue": "1"}));
    assert_eq!(body["fields"]["duration"], json!({"integerValue": "123"}));
    assert!(body["fields"]["startedAt"]["timestampValue"].is_string());
}

#[tokio::test]
async fn update_commits_a_masked_write_to_an_existing_document() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow_update("build", "1").await;

    signed_in(&server)
        .update_document("build", "1", &json!({"duration": 124}))
        .await
        .unwrap();

    let requests = server.received_requests().await;
    assert_eq!(requests[0].url.path(), server.commit_path());
    let write = &commit_body(&requests[0])["writes"][0];
    assert_eq!(write["update"]["name"], json!(server.document_name("build", "1")));
    assert_eq!(write["update"]["fields"]["duration"], json!({"integerValue": "124"}));
    assert_eq!(write["updateMask"]["fieldPaths"], json!(["duration"]));
    assert_eq!(write["currentDocument"]["exists"], json!(true));
}

#[tokio::test]
async fn empty_update_keeps_every_field() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow_update("build", "1").await;

    signed_in(&server)
        .update_document("build", "1", &json!({}))
        .await
        .unwrap();

    let requests = server.received_requests().await;
    let write = &commit_body(&requests[0])["writes"][0];
    // An empty mask touches nothing; without one the write would replace the document.
    assert_eq!(write["updateMask"]["fieldPaths"], json!([]));
    assert_eq!(write["currentDocument"]["exists"], json!(true));
}

#[tokio::test]
async fn denied_update_is_a_denial() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow_update_for_uid("build", "1", fixtures::user_uid()).await;
    server.deny_update("build", "1").await;

    assert_eq!(
        signed_in(&server)
            .update_document("build", "1", &json!({"duration": 1}))
            .await,
        Ok(())
    );
    let denied = session(&server, None)
        .update_document("build", "1", &json!({"duration": 1}))
        .await
        .unwrap_err();
    assert!(denied.is_denial(), "{denied:?}");
}

#[tokio::test]
async fn oversized_integer_never_reaches_the_emulator() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow("POST", "build", None).await;

    let err = signed_in(&server)
        .create_document("build", &json!({"duration": u64::MAX}))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Malformed { .. }), "{err:?}");
    server.assert_request_count(0).await;
}

#[tokio::test]
async fn upsert_has_no_precondition() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow("PATCH", "build", Some("2")).await;

    signed_in(&server)
        .upsert_document("build", "2", &json!({"duration": 1}))
        .await
        .unwrap();

    let requests = server.received_requests().await;
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn status_mapping() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server
        .respond("DELETE", "build", Some("1"), 400, json!({"error": {"message": "bad"}}))
        .await;
    let owner = signed_in(&server);

    assert_eq!(
        owner.delete_document("build", "1").await,
        Err(BackendError::malformed("bad"))
    );
    // No mock mounted: the server answers 404, which is not a denial.
    let missing = owner.get_document("build", "9").await.unwrap_err();
    assert!(matches!(missing, BackendError::Transport { .. }), "{missing:?}");
}

#[tokio::test]
async fn unreachable_emulator_is_a_transport_error() {
    let unreachable = EmulatorSession::new(reqwest::Client::new(), "http://127.0.0.1:1", PROJECT, None);
    let err = unreachable.read_collection("build").await.unwrap_err();
    assert!(matches!(err, BackendError::Transport { .. }), "{err:?}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Suite
// ─────────────────────────────────────────────────────────────────────────────

fn suite_file(server: &MockEmulatorServer) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
emulator_url = "{url}"
project_id = "{project}"
case_timeout_ms = 2000

[documents."feature_config/feature_config"]
isPublicDashboardEnabled = true

[[personas]]
label = "authenticated user"
auth = {{ uid = "uid" }}
[personas.public_dashboard.on]
read = true
update = true
delete = true
[personas.public_dashboard.off]
read = true
update = true
delete = true

[[personas]]
label = "unauthenticated user"
[personas.public_dashboard.on]
read = true
[personas.public_dashboard.off]
read = false

[[scenarios]]
collection = "build"
update_payload = {{ duration = 124 }}
"#,
        url = server.base_url(),
        project = server.project_id(),
    )
    .unwrap();
    file
}

#[tokio::test]
async fn plan_does_not_contact_the_emulator() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    let file = suite_file(&server);
    let config = SuiteConfig::load(file.path()).unwrap();

    let plan = plan_suite(&config, &reqwest::Client::new(), &RunLog::new()).unwrap();

    assert_eq!(plan.case_count(), 6);
    assert_eq!(plan.groups()[0].title, "authenticated user");
    server.assert_request_count(0).await;
}

#[tokio::test]
async fn suite_run_against_agreeing_rules_passes() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    server.allow_for_uid("GET", "build", None, "uid").await;
    server.allow_for_uid("DELETE", "build", Some("1"), "uid").await;
    server.allow_update_for_uid("build", "1", "uid").await;
    server.allow("GET", "build", None).await;
    server.deny_update("build", "1").await;
    server.deny("DELETE", "build", Some("1")).await;

    let file = suite_file(&server);
    let config = SuiteConfig::load(file.path()).unwrap();
    let log = RunLog::new();

    let report = run_suite(&config, &reqwest::Client::new(), None, &log)
        .await
        .unwrap();

    assert!(report.all_passed(), "{}", report.render_text());
    assert_eq!(report.passed, 6);
    server.assert_request_count(6).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    log.write_jsonl(&path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written.lines().count(), 12);
}

#[tokio::test]
async fn suite_run_reports_rule_drift() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    // Rules allow anonymous deletes, which the suite expects to be denied.
    server.allow_for_uid("GET", "build", None, "uid").await;
    server.allow_update_for_uid("build", "1", "uid").await;
    server.allow("GET", "build", None).await;
    server.deny_update("build", "1").await;
    server.allow("DELETE", "build", Some("1")).await;

    let file = suite_file(&server);
    let config = SuiteConfig::load(file.path()).unwrap();

    let report = run_suite(&config, &reqwest::Client::new(), None, &RunLog::new())
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.group, "unauthenticated user");
    assert_eq!(failure.name, "does not allow deleting a document");
}

#[tokio::test]
async fn invalid_persona_stops_the_run_before_any_request() {
    init_test_tracing();
    let server = MockEmulatorServer::start(PROJECT).await;
    let file = suite_file(&server);
    let mut config = SuiteConfig::load(file.path()).unwrap();
    config.personas[0].auth = Some(serde_json::Map::new());

    let result = run_suite(&config, &reqwest::Client::new(), None, &RunLog::new()).await;

    assert!(matches!(result, Err(ConfigError::Invalid { .. })), "{result:?}");
    server.assert_request_count(0).await;
}
