//! Backend session over a document-database emulator's REST surface.
//!
//! Paths follow `/v1/projects/{project}/databases/(default)/documents`.
//! Authenticated sessions send `Authorization: Bearer <id token>`, where the
//! token is an unsigned mock ID token minted from the persona's auth claims;
//! the anonymous session sends no credentials. The emulator evaluates rules
//! against those claims. It treats the literal bearer `owner` as an admin
//! that bypasses rules, so that string is never sent.
//!
//! Status mapping:
//! - 2xx: success
//! - 403, or any body with status `PERMISSION_DENIED`: [`BackendError::Denied`]
//! - 400: [`BackendError::Malformed`]
//! - everything else, including connection failures: [`BackendError::Transport`]

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use reqwest::{Method, RequestBuilder, StatusCode};
use rulecheck_core::{BackendError, BackendResult, BackendSession, async_trait};
use rulecheck_testkit::fixtures::TIMESTAMP_TAG;
use serde_json::{Map, Value, json};
use tracing::trace;

/// Lifetime of a minted ID token.
const TOKEN_TTL_SECS: i64 = 3600;

/// Claims the mock ID token is built from.
///
/// Claims the token itself defines (`sub`, `user_id`, `iss`, `aud`, ...)
/// cannot be overridden by extra claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthClaims {
    uid: String,
    extra: Map<String, Value>,
}

impl AuthClaims {
    /// Claims for a signed-in user with `uid` and nothing else.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            extra: Map::new(),
        }
    }

    /// Claims from a user object such as `{"uid": "uid", "email": ...}`.
    ///
    /// Returns `None` unless `user` is an object with a non-empty string
    /// `uid`. Every other key becomes an extra claim.
    #[must_use]
    pub fn from_user(user: &Value) -> Option<Self> {
        let object = user.as_object()?;
        let uid = object.get("uid")?.as_str().filter(|uid| !uid.is_empty())?;
        let extra = object
            .iter()
            .filter(|(key, _)| key.as_str() != "uid")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Self {
            uid: uid.to_string(),
            extra,
        })
    }

    /// Add one extra claim.
    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Payload of the ID token for `project_id`, issued at `issued_at`.
    #[must_use]
    pub fn token_payload(&self, project_id: &str, issued_at: i64) -> Value {
        let mut payload = self.extra.clone();
        payload.insert("uid".to_string(), json!(self.uid));
        let fixed = json!({
            "iss": format!("https://securetoken.google.com/{project_id}"),
            "aud": project_id,
            "iat": issued_at,
            "exp": issued_at + TOKEN_TTL_SECS,
            "auth_time": issued_at,
            "sub": self.uid,
            "user_id": self.uid,
            "firebase": { "sign_in_provider": "custom", "identities": {} },
        });
        if let Value::Object(fixed) = fixed {
            payload.extend(fixed);
        }
        Value::Object(payload)
    }

    /// Unsigned (`alg: none`) ID token the emulator accepts for these claims.
    #[must_use]
    pub fn mock_id_token(&self, project_id: &str) -> String {
        let header = json!({ "alg": "none", "kid": "fakekid", "typ": "JWT" });
        let payload = self.token_payload(project_id, Utc::now().timestamp());
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }
}

/// One identity's session against the emulator.
#[derive(Debug, Clone)]
pub struct EmulatorSession {
    client: reqwest::Client,
    database: String,
    base_url: String,
    uid: Option<String>,
    token: Option<String>,
}

impl EmulatorSession {
    /// Session for `project_id` on the emulator at `emulator_url`.
    ///
    /// `auth` holds the signed-in user's claims; `None` acts anonymously. The
    /// client is shared between sessions.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        emulator_url: &str,
        project_id: &str,
        auth: Option<&AuthClaims>,
    ) -> Self {
        Self {
            client,
            database: format!("projects/{project_id}/databases/(default)"),
            base_url: emulator_url.trim_end_matches('/').to_string(),
            uid: auth.map(|claims| claims.uid().to_string()),
            token: auth.map(|claims| claims.mock_id_token(project_id)),
        }
    }

    /// Whether this session sends credentials.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Signed-in user id, if any.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/documents/{collection}/{id}", self.database)
    }

    fn url(&self, collection: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/v1/{}", self.base_url, self.document_name(collection, id)),
            None => format!("{}/v1/{}/documents/{collection}", self.base_url, self.database),
        }
    }

    fn commit_url(&self) -> String {
        format!("{}/v1/{}/documents:commit", self.base_url, self.database)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult {
        let response = builder
            .send()
            .await
            .map_err(|err| BackendError::transport(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        trace!(%status, body = %body, "emulator response");
        classify(status, &body)
    }
}

/// Map an emulator response onto a backend result.
fn classify(status: StatusCode, body: &str) -> BackendResult {
    if status.is_success() {
        return Ok(());
    }

    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];
    let message = error["message"]
        .as_str()
        .map_or_else(|| format!("HTTP {status}"), str::to_string);

    if status == StatusCode::FORBIDDEN || error["status"] == "PERMISSION_DENIED" {
        Err(BackendError::denied(message))
    } else if status == StatusCode::BAD_REQUEST {
        Err(BackendError::malformed(message))
    } else {
        Err(BackendError::transport(format!("HTTP {status}: {message}")))
    }
}

/// Encode a JSON document into the emulator's `{"fields": {...}}` form.
///
/// # Errors
/// Returns [`BackendError::Malformed`] unless `payload` is a JSON object whose
/// integers all fit a signed 64-bit value.
pub fn encode_document(payload: &Value) -> Result<Value, BackendError> {
    let object = payload
        .as_object()
        .ok_or_else(|| BackendError::malformed("document payload must be a JSON object"))?;
    Ok(json!({ "fields": encode_fields(object)? }))
}

/// Commit body for a field-masked update of an existing document.
///
/// The mask names exactly the payload's top-level fields, so an empty payload
/// writes nothing and only checks that the document exists.
///
/// # Errors
/// Same as [`encode_document`].
pub fn update_write(document_name: &str, payload: &Value) -> Result<Value, BackendError> {
    let encoded = encode_document(payload)?;
    let field_paths: Vec<String> = payload
        .as_object()
        .map(|object| object.keys().map(|key| field_path(key)).collect())
        .unwrap_or_default();
    Ok(json!({
        "writes": [{
            "update": { "name": document_name, "fields": encoded["fields"] },
            "updateMask": { "fieldPaths": field_paths },
            "currentDocument": { "exists": true },
        }]
    }))
}

fn encode_fields(object: &Map<String, Value>) -> Result<Map<String, Value>, BackendError> {
    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), encode_value(value)?)))
        .collect()
}

fn encode_value(value: &Value) -> Result<Value, BackendError> {
    Ok(match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_f64() => json!({ "doubleValue": n.as_f64() }),
        Value::Number(n) => {
            let int = n.as_i64().ok_or_else(|| {
                BackendError::malformed(format!("integer {n} does not fit a signed 64-bit value"))
            })?;
            json!({ "integerValue": int.to_string() })
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values = items.iter().map(encode_value).collect::<Result<Vec<_>, _>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(object) => match timestamp_tag(object) {
            Some(ts) => json!({ "timestampValue": ts }),
            None => json!({ "mapValue": { "fields": encode_fields(object)? } }),
        },
    })
}

fn timestamp_tag(object: &Map<String, Value>) -> Option<&str> {
    if object.len() != 1 {
        return None;
    }
    object.get(TIMESTAMP_TAG).and_then(Value::as_str)
}

/// Field path for an update mask; non-identifier keys are backtick-quoted.
fn field_path(key: &str) -> String {
    let simple = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        key.to_string()
    } else {
        format!("`{}`", key.replace('`', "\\`"))
    }
}

#[async_trait]
impl BackendSession for EmulatorSession {
    async fn create_document(&self, collection: &str, payload: &Value) -> BackendResult {
        let body = encode_document(payload)?;
        let url = self.url(collection, None);
        self.send(self.request(Method::POST, &url).json(&body)).await
    }

    async fn read_collection(&self, collection: &str) -> BackendResult {
        let url = self.url(collection, None);
        self.send(self.request(Method::GET, &url)).await
    }

    async fn update_document(&self, collection: &str, id: &str, payload: &Value) -> BackendResult {
        let body = update_write(&self.document_name(collection, id), payload)?;
        let url = self.commit_url();
        self.send(self.request(Method::POST, &url).json(&body)).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult {
        let url = self.url(collection, Some(id));
        self.send(self.request(Method::DELETE, &url)).await
    }

    async fn upsert_document(&self, collection: &str, id: &str, payload: &Value) -> BackendResult {
        let body = encode_document(payload)?;
        let url = self.url(collection, Some(id));
        self.send(self.request(Method::PATCH, &url).json(&body)).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult {
        let url = self.url(collection, Some(id));
        self.send(self.request(Method::GET, &url)).await
    }
}
