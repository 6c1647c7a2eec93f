//! Sample documents used as known-good payloads.
//!
//! Everything here is plain data. Build timestamps are taken at call time, so
//! each call returns fresh records.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

/// Key under which a timestamp is tagged inside a JSON payload.
///
/// Backends that have a native timestamp type (see the emulator session)
/// encode `{"$timestamp": "<rfc3339>"}` as that type.
pub const TIMESTAMP_TAG: &str = "$timestamp";

/// Tag an instant as a backend timestamp.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> Value {
    json!({ TIMESTAMP_TAG: at.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

/// Two projects keyed by document path.
#[must_use]
pub fn projects() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("projects/1".to_string(), json!({"name": "project_1"})),
        ("projects/2".to_string(), json!({"name": "project_2"})),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Builds
// ─────────────────────────────────────────────────────────────────────────────

/// A single build record, suitable as a create payload.
#[must_use]
pub fn build() -> Value {
    json!({
        "projectId": "1",
        "startedAt": timestamp(Utc::now()),
        "duration": 123,
        "url": "url",
    })
}

/// Two build records keyed by document path.
#[must_use]
pub fn builds() -> BTreeMap<String, Value> {
    let now = Utc::now();
    BTreeMap::from([
        (
            "build/1".to_string(),
            json!({
                "projectId": "1",
                "startedAt": timestamp(now),
                "duration": 234,
                "url": "url",
            }),
        ),
        (
            "build/2".to_string(),
            json!({
                "projectId": "1",
                "startedAt": timestamp(now),
                "duration": 345,
                "url": "url1",
            }),
        ),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of the signed-in test user.
#[must_use]
pub fn user() -> Value {
    json!({"uid": "uid"})
}

/// Uid of [`user`].
#[must_use]
pub const fn user_uid() -> &'static str {
    "uid"
}
