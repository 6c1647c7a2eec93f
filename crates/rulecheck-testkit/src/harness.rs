//! Recording session wrapper.
//!
//! [`RecordingSession`] wraps any [`BackendSession`] and records every call
//! with its result and timing, so tests can assert how many operations a run
//! issued and in which order.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use rulecheck_core::{Action, BackendResult, BackendSession};
use tracing::debug;

/// Recorded backend call for test inspection.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Backend call kind
    pub action: Action,
    /// Target collection
    pub collection: String,
    /// Document id, for calls that address one document
    pub document_id: Option<String>,
    /// Payload, for writes
    pub payload: Option<serde_json::Value>,
    /// Result as returned to the caller
    pub result: BackendResult,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Session wrapper that records every call made through it.
pub struct RecordingSession<S> {
    inner: S,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl<S: BackendSession> RecordingSession<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a reference to the wrapped session.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Snapshot of all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Actions in call order.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.calls.lock().iter().map(|call| call.action).collect()
    }

    /// Clear recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Assert total call count.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub fn assert_call_count(&self, expected: usize) {
        let actual = self.calls.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {expected} backend calls but got {actual}"
        );
    }

    /// Assert the recorded actions, in order.
    ///
    /// # Panics
    ///
    /// Panics if the sequence differs.
    pub fn assert_actions(&self, expected: &[Action]) {
        let actual = self.actions();
        assert_eq!(actual, expected, "Unexpected backend call sequence");
    }

    async fn record<F>(
        &self,
        action: Action,
        collection: &str,
        document_id: Option<&str>,
        payload: Option<&serde_json::Value>,
        call: F,
    ) -> BackendResult
    where
        F: Future<Output = BackendResult> + Send,
    {
        let start = Instant::now();
        let result = call.await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(%action, collection, ?result, "recorded backend call");

        self.calls.lock().push(RecordedCall {
            action,
            collection: collection.to_string(),
            document_id: document_id.map(str::to_string),
            payload: payload.cloned(),
            result: result.clone(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
        result
    }
}

#[async_trait]
impl<S: BackendSession> BackendSession for RecordingSession<S> {
    async fn create_document(
        &self,
        collection: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        self.record(
            Action::Add,
            collection,
            None,
            Some(payload),
            self.inner.create_document(collection, payload),
        )
        .await
    }

    async fn read_collection(&self, collection: &str) -> BackendResult {
        self.record(
            Action::Query,
            collection,
            None,
            None,
            self.inner.read_collection(collection),
        )
        .await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        self.record(
            Action::Update,
            collection,
            Some(id),
            Some(payload),
            self.inner.update_document(collection, id, payload),
        )
        .await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult {
        self.record(
            Action::Delete,
            collection,
            Some(id),
            None,
            self.inner.delete_document(collection, id),
        )
        .await
    }

    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        self.record(
            Action::Set,
            collection,
            Some(id),
            Some(payload),
            self.inner.upsert_document(collection, id, payload),
        )
        .await
    }

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult {
        self.record(
            Action::Get,
            collection,
            Some(id),
            None,
            self.inner.get_document(collection, id),
        )
        .await
    }
}
