//! Mock document-database emulator.
//!
//! Wraps wiremock with the emulator's REST layout so the HTTP session can be
//! tested without a running emulator. Identity-scoped mocks match on the
//! `sub` claim of the bearer ID token, the same claim the emulator's rules see
//! as `request.auth.uid`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Match, Mock, MockBuilder, MockServer, Request, ResponseTemplate};

/// `sub` claim of the request's bearer ID token, if it carries one.
#[must_use]
pub fn bearer_subject(request: &Request) -> Option<String> {
    let value = request.headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    let payload = token.split('.').nth(1)?;
    let claims: serde_json::Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    claims.get("sub")?.as_str().map(str::to_string)
}

/// Matches requests whose bearer ID token names `uid` as its subject.
struct BearerSubject(String);

impl Match for BearerSubject {
    fn matches(&self, request: &Request) -> bool {
        bearer_subject(request).as_deref() == Some(self.0.as_str())
    }
}

/// Body the emulator returns when a rule rejects a request.
#[must_use]
pub fn permission_denied_body(message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": 403,
            "message": message,
            "status": "PERMISSION_DENIED"
        }
    })
}

/// A mock emulator for one project.
pub struct MockEmulatorServer {
    server: MockServer,
    project_id: String,
}

impl MockEmulatorServer {
    /// Start a mock emulator serving `project_id`.
    pub async fn start(project_id: impl Into<String>) -> Self {
        Self {
            server: MockServer::start().await,
            project_id: project_id.into(),
        }
    }

    /// Base URL of the mock emulator.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Request path for a collection, or for a document when `id` is given.
    #[must_use]
    pub fn document_path(&self, collection: &str, id: Option<&str>) -> String {
        let base = format!(
            "/v1/projects/{}/databases/(default)/documents/{collection}",
            self.project_id
        );
        match id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    /// Request path of the batched-write endpoint used for updates.
    #[must_use]
    pub fn commit_path(&self) -> String {
        format!(
            "/v1/projects/{}/databases/(default)/documents:commit",
            self.project_id
        )
    }

    /// Full resource name of a document, as it appears in write bodies.
    #[must_use]
    pub fn document_name(&self, collection: &str, id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{collection}/{id}",
            self.project_id
        )
    }

    /// Get the underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Response Setup
    // ─────────────────────────────────────────────────────────────────────────────

    /// Respond to `http_method` on the collection/document with `status` and `body`.
    pub async fn respond(
        &self,
        http_method: &str,
        collection: &str,
        id: Option<&str>,
        status: u16,
        body: serde_json::Value,
    ) {
        self.route(http_method, collection, id)
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Respond to an update of `collection/id` with `status` and `body`.
    pub async fn respond_update(
        &self,
        collection: &str,
        id: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        self.update_route(collection, id)
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Accept `http_method` on the collection/document.
    pub async fn allow(&self, http_method: &str, collection: &str, id: Option<&str>) {
        self.respond(http_method, collection, id, 200, serde_json::json!({}))
            .await;
    }

    /// Reject `http_method` on the collection/document with a rule denial.
    pub async fn deny(&self, http_method: &str, collection: &str, id: Option<&str>) {
        self.respond(
            http_method,
            collection,
            id,
            403,
            permission_denied_body("Missing or insufficient permissions."),
        )
        .await;
    }

    /// Accept an update of `collection/id`.
    pub async fn allow_update(&self, collection: &str, id: &str) {
        self.respond_update(collection, id, 200, serde_json::json!({}))
            .await;
    }

    /// Reject an update of `collection/id` with a rule denial.
    pub async fn deny_update(&self, collection: &str, id: &str) {
        self.respond_update(
            collection,
            id,
            403,
            permission_denied_body("Missing or insufficient permissions."),
        )
        .await;
    }

    /// Accept `http_method` only for a bearer ID token whose subject is `uid`.
    ///
    /// Takes precedence over [`Self::allow`] and [`Self::deny`].
    pub async fn allow_for_uid(
        &self,
        http_method: &str,
        collection: &str,
        id: Option<&str>,
        uid: &str,
    ) {
        self.route(http_method, collection, id)
            .and(BearerSubject(uid.to_string()))
            .respond_with(json_response(200, serde_json::json!({})))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Accept an update of `collection/id` only for the user `uid`.
    pub async fn allow_update_for_uid(&self, collection: &str, id: &str, uid: &str) {
        self.update_route(collection, id)
            .and(BearerSubject(uid.to_string()))
            .respond_with(json_response(200, serde_json::json!({})))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    fn route(&self, http_method: &str, collection: &str, id: Option<&str>) -> MockBuilder {
        Mock::given(method(http_method)).and(path(self.document_path(collection, id)))
    }

    fn update_route(&self, collection: &str, id: &str) -> MockBuilder {
        Mock::given(method("POST"))
            .and(path(self.commit_path()))
            .and(body_partial_json(serde_json::json!({
                "writes": [{ "update": { "name": self.document_name(collection, id) } }]
            })))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// Verify that a specific number of requests were received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}",
            expected,
            received.len()
        );
    }

    /// Get all received requests for manual inspection.
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_emulator_paths() {
        let mock = MockEmulatorServer::start("rules-spec").await;
        mock.allow("GET", "build", None).await;
        mock.deny("DELETE", "build", Some("1")).await;

        let client = reqwest::Client::new();
        let ok = client
            .get(format!("{}{}", mock.base_url(), mock.document_path("build", None)))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);

        let denied = client
            .delete(format!(
                "{}{}",
                mock.base_url(),
                mock.document_path("build", Some("1"))
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), 403);
        let body: serde_json::Value = denied.json().await.unwrap();
        assert_eq!(body["error"]["status"], "PERMISSION_DENIED");

        mock.assert_request_count(2).await;
    }

    fn id_token(uid: &str) -> String {
        let payload = serde_json::json!({ "sub": uid, "user_id": uid });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    #[tokio::test]
    async fn uid_scoped_allow() {
        let mock = MockEmulatorServer::start("p").await;
        mock.deny("GET", "projects", None).await;
        mock.allow_for_uid("GET", "projects", None, "uid").await;

        let url = format!("{}{}", mock.base_url(), mock.document_path("projects", None));
        let client = reqwest::Client::new();
        let anonymous = client.get(&url).send().await.unwrap();
        let stranger = client.get(&url).bearer_auth(id_token("other")).send().await.unwrap();
        let user = client.get(&url).bearer_auth(id_token("uid")).send().await.unwrap();
        let admin = client.get(&url).bearer_auth("owner").send().await.unwrap();

        assert_eq!(anonymous.status(), 403);
        assert_eq!(stranger.status(), 403);
        assert_eq!(user.status(), 200);
        assert_eq!(admin.status(), 403);

        let requests = mock.received_requests().await;
        assert_eq!(bearer_subject(&requests[2]).as_deref(), Some("uid"));
        assert_eq!(bearer_subject(&requests[3]), None);
    }

    #[tokio::test]
    async fn updates_route_by_document_name() {
        let mock = MockEmulatorServer::start("p").await;
        mock.deny_update("build", "1").await;
        mock.allow_update_for_uid("build", "1", "uid").await;
        mock.allow_update("build", "2").await;

        let url = format!("{}{}", mock.base_url(), mock.commit_path());
        let write = |id: &str| {
            serde_json::json!({
                "writes": [{
                    "update": { "name": mock.document_name("build", id), "fields": {} },
                    "updateMask": { "fieldPaths": [] },
                    "currentDocument": { "exists": true },
                }]
            })
        };
        let client = reqwest::Client::new();

        let anonymous = client.post(&url).json(&write("1")).send().await.unwrap();
        let user = client
            .post(&url)
            .bearer_auth(id_token("uid"))
            .json(&write("1"))
            .send()
            .await
            .unwrap();
        let other_doc = client.post(&url).json(&write("2")).send().await.unwrap();

        assert_eq!(anonymous.status(), 403);
        assert_eq!(user.status(), 200);
        assert_eq!(other_doc.status(), 200);
    }
}
