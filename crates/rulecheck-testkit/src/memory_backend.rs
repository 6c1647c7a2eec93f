//! In-memory rule backend.
//!
//! A deterministic stand-in for the rule-enforcing backend. Rules are a plain
//! allow table keyed by identity, collection and operation; everything not
//! allowed is denied. Faults can be injected per identity and action to
//! exercise the harness's error paths.
//!
//! Collection queries are allowed by either a `read` or a `list` grant, and
//! single-document reads by either `read` or `get`, the same way a `read`
//! rule covers both in document-database rule languages.
//!
//! # Example
//!
//! ```rust
//! use rulecheck_core::Operation;
//! use rulecheck_testkit::MemoryBackend;
//!
//! let backend = MemoryBackend::new()
//!     .allow(Some("uid"), "build", &[Operation::Read, Operation::Create]);
//! let owner = backend.session(Some("uid"));
//! let anonymous = backend.session(None);
//! # let _ = (owner, anonymous);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rulecheck_core::{Action, BackendError, BackendResult, BackendSession, Operation};
use tracing::trace;

/// Failure injected in place of a rule decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with [`BackendError::Transport`].
    Transport(String),
    /// Fail with [`BackendError::Malformed`].
    Malformed(String),
    /// Never complete.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    identity: Option<String>,
    collection: String,
    operation: Operation,
}

#[derive(Debug, Default)]
struct State {
    allowed: HashSet<RuleKey>,
    faults: HashMap<(Option<String>, Action), Fault>,
}

/// Shared in-memory backend. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    calls: Arc<AtomicU64>,
}

impl MemoryBackend {
    /// Backend that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `operations` on `collection` for `identity` (`None` = anonymous).
    #[must_use]
    pub fn allow(self, identity: Option<&str>, collection: &str, operations: &[Operation]) -> Self {
        {
            let mut state = self.state.lock();
            for operation in operations {
                state.allowed.insert(RuleKey {
                    identity: identity.map(str::to_string),
                    collection: collection.to_string(),
                    operation: *operation,
                });
            }
        }
        self
    }

    /// Replace the rule decision for `action` by `identity` with a fault.
    #[must_use]
    pub fn inject_fault(self, identity: Option<&str>, action: Action, fault: Fault) -> Self {
        self.state
            .lock()
            .faults
            .insert((identity.map(str::to_string), action), fault);
        self
    }

    /// Session acting as `identity`.
    #[must_use]
    pub fn session(&self, identity: Option<&str>) -> Arc<MemorySession> {
        Arc::new(MemorySession {
            backend: self.clone(),
            identity: identity.map(str::to_string),
        })
    }

    /// Total operations received across all sessions.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, identity: Option<&str>, collection: &str, operation: Operation) -> bool {
        let key = RuleKey {
            identity: identity.map(str::to_string),
            collection: collection.to_string(),
            operation,
        };
        self.state.lock().allowed.contains(&key)
    }

    fn fault(&self, identity: Option<&str>, action: Action) -> Option<Fault> {
        self.state
            .lock()
            .faults
            .get(&(identity.map(str::to_string), action))
            .cloned()
    }

    async fn decide(
        &self,
        identity: Option<&str>,
        action: Action,
        collection: &str,
        grants: &[Operation],
    ) -> BackendResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.fault(identity, action) {
            Some(Fault::Transport(message)) => return Err(BackendError::transport(message)),
            Some(Fault::Malformed(message)) => return Err(BackendError::malformed(message)),
            Some(Fault::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let allowed = grants
            .iter()
            .any(|operation| self.is_allowed(identity, collection, *operation));
        trace!(?identity, %action, collection, allowed, "memory backend decision");

        if allowed {
            Ok(())
        } else {
            Err(BackendError::denied(format!(
                "{action} on {collection} not allowed"
            )))
        }
    }
}

/// Session bound to one identity of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemorySession {
    backend: MemoryBackend,
    identity: Option<String>,
}

impl MemorySession {
    /// Identity this session acts as; `None` for anonymous.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    async fn decide(&self, action: Action, collection: &str, grants: &[Operation]) -> BackendResult {
        self.backend
            .decide(self.identity.as_deref(), action, collection, grants)
            .await
    }
}

#[async_trait]
impl BackendSession for MemorySession {
    async fn create_document(
        &self,
        collection: &str,
        _payload: &serde_json::Value,
    ) -> BackendResult {
        self.decide(Action::Add, collection, &[Operation::Create])
            .await
    }

    async fn read_collection(&self, collection: &str) -> BackendResult {
        self.decide(Action::Query, collection, &[Operation::Read, Operation::List])
            .await
    }

    async fn update_document(
        &self,
        collection: &str,
        _id: &str,
        _payload: &serde_json::Value,
    ) -> BackendResult {
        self.decide(Action::Update, collection, &[Operation::Update])
            .await
    }

    async fn delete_document(&self, collection: &str, _id: &str) -> BackendResult {
        self.decide(Action::Delete, collection, &[Operation::Delete])
            .await
    }

    async fn upsert_document(
        &self,
        collection: &str,
        _id: &str,
        _payload: &serde_json::Value,
    ) -> BackendResult {
        self.decide(Action::Set, collection, &[Operation::Create])
            .await
    }

    async fn get_document(&self, collection: &str, _id: &str) -> BackendResult {
        self.decide(Action::Get, collection, &[Operation::Read, Operation::Get])
            .await
    }
}
