//! Backend session trait.
//!
//! A session issues operations as one identity (authenticated or anonymous)
//! against the rule-enforcing backend. Implementations do not interpret the
//! outcome; they only report whether the backend accepted the operation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Action, BackendResult};

/// Per-persona handle to the backend under test.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Add a document with a backend-assigned id.
    async fn create_document(&self, collection: &str, payload: &serde_json::Value)
    -> BackendResult;

    /// Query every document of a collection.
    async fn read_collection(&self, collection: &str) -> BackendResult;

    /// Update fields of an existing document.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult;

    /// Delete a document.
    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult;

    /// Write a document at a fixed id, creating it if needed.
    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult;

    /// Fetch a single document.
    async fn get_document(&self, collection: &str, id: &str) -> BackendResult;
}

/// Shared session handle.
pub type SharedSession = Arc<dyn BackendSession>;

#[async_trait]
impl<T: BackendSession + ?Sized> BackendSession for Arc<T> {
    async fn create_document(
        &self,
        collection: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        (**self).create_document(collection, payload).await
    }

    async fn read_collection(&self, collection: &str) -> BackendResult {
        (**self).read_collection(collection).await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        (**self).update_document(collection, id, payload).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult {
        (**self).delete_document(collection, id).await
    }

    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        payload: &serde_json::Value,
    ) -> BackendResult {
        (**self).upsert_document(collection, id, payload).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult {
        (**self).get_document(collection, id).await
    }
}

/// A fully specified backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    pub action: Action,
    pub collection: String,
    pub document_id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl BackendCall {
    /// Issue this call through `session`.
    ///
    /// A missing payload is sent as an empty document, so an update case
    /// without an update payload still reaches the rule engine. A missing id
    /// is sent as an empty id.
    pub async fn issue(&self, session: &dyn BackendSession) -> BackendResult {
        let collection = self.collection.as_str();
        let id = self.document_id.as_deref().unwrap_or_default();
        let empty = serde_json::Value::Object(serde_json::Map::new());
        let payload = self.payload.as_ref().unwrap_or(&empty);

        match self.action {
            Action::Add => session.create_document(collection, payload).await,
            Action::Query | Action::List => session.read_collection(collection).await,
            Action::Update => session.update_document(collection, id, payload).await,
            Action::Delete => session.delete_document(collection, id).await,
            Action::Set => session.upsert_document(collection, id, payload).await,
            Action::Get => session.get_document(collection, id).await,
        }
    }
}
