//! Scenario matrix resolution.
//!
//! Turns a persona's capability table and a scenario request into the ordered
//! list of cases to check against the backend. Resolution is pure: it never
//! touches the session.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Action, BackendCall, CapabilityView, FeatureFlagContext, FlagSensitiveCollections, Operation,
    Persona, ResolutionError,
};

/// Document id used when a request does not name one.
pub const DEFAULT_TARGET_ID: &str = "1";

/// One collection to exercise, with the sample documents that drive it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioRequest {
    pub collection: String,
    /// Document added with a backend-assigned id. Enables the create case.
    pub create_payload: Option<serde_json::Value>,
    /// Fields written by the update case.
    pub update_payload: Option<serde_json::Value>,
    /// Document written at the target id. Enables the upsert case.
    pub set_payload: Option<serde_json::Value>,
    /// Document addressed by update/delete/upsert/get.
    pub target_id: Option<String>,
}

impl ScenarioRequest {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_create(mut self, payload: serde_json::Value) -> Self {
        self.create_payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_update(mut self, payload: serde_json::Value) -> Self {
        self.update_payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_set(mut self, payload: serde_json::Value) -> Self {
        self.set_payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    /// Target id, falling back to [`DEFAULT_TARGET_ID`].
    #[must_use]
    pub fn target_id(&self) -> &str {
        self.target_id.as_deref().unwrap_or(DEFAULT_TARGET_ID)
    }
}

/// Whether the backend is expected to accept an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Allowed,
    Denied,
}

impl ExpectedOutcome {
    #[must_use]
    pub const fn from_allowed(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }

    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => f.write_str("allowed"),
            Self::Denied => f.write_str("denied"),
        }
    }
}

/// One (operation, expected outcome) pair for a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCase {
    pub operation: Operation,
    pub action: Action,
    pub expected: ExpectedOutcome,
    pub description: String,
    /// Document id for actions that address one document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl ResolvedCase {
    fn new(action: Action, allowed: bool, request: &ScenarioRequest) -> Self {
        let expected = ExpectedOutcome::from_allowed(allowed);
        let verb = if allowed { "allows" } else { "does not allow" };
        Self {
            operation: action.operation(),
            action,
            expected,
            description: format!("{verb} {}", action.phrase()),
            document_id: action
                .targets_document()
                .then(|| request.target_id().to_string()),
        }
    }

    /// Backend call exercising this case for `request`.
    #[must_use]
    pub fn call(&self, request: &ScenarioRequest) -> BackendCall {
        let payload = match self.action {
            Action::Add => request.create_payload.clone(),
            Action::Update => request.update_payload.clone(),
            Action::Set => request.set_payload.clone(),
            Action::Query | Action::Delete | Action::List | Action::Get => None,
        };
        BackendCall {
            action: self.action,
            collection: request.collection.clone(),
            document_id: self.document_id.clone(),
            payload,
        }
    }
}

/// Resolves personas against scenario requests.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMatrix {
    flag_sensitive: FlagSensitiveCollections,
}

impl ScenarioMatrix {
    #[must_use]
    pub const fn new(flag_sensitive: FlagSensitiveCollections) -> Self {
        Self { flag_sensitive }
    }

    #[must_use]
    pub const fn flag_sensitive(&self) -> &FlagSensitiveCollections {
        &self.flag_sensitive
    }

    /// Resolve the ordered cases for `persona` on `request`.
    ///
    /// # Errors
    /// Returns a [`ResolutionError`] when the persona's capability shape does
    /// not fit the collection; no partial case list is produced.
    pub fn resolve(
        &self,
        persona: &Persona,
        request: &ScenarioRequest,
        flags: FeatureFlagContext,
    ) -> Result<Vec<ResolvedCase>, ResolutionError> {
        let sensitive = self.flag_sensitive.contains(&request.collection);
        let view = CapabilityView::select(
            persona.label(),
            &request.collection,
            persona.capabilities(),
            sensitive,
            flags,
        )?;
        let cases = resolve_view(&view, request)?;
        debug!(
            persona = persona.label(),
            collection = %request.collection,
            flag = flags.state_name(),
            cases = cases.len(),
            "resolved scenario"
        );
        Ok(cases)
    }
}

/// Case list for an already selected capability view.
///
/// # Errors
/// Returns [`ResolutionError::GatedSetRequired`] if an upsert, list or get
/// case is triggered for a persona without flag-gated capabilities.
pub fn resolve_view(
    view: &CapabilityView<'_>,
    request: &ScenarioRequest,
) -> Result<Vec<ResolvedCase>, ResolutionError> {
    let effective = view.effective();
    let mut cases = Vec::with_capacity(7);

    if request.create_payload.is_some() {
        cases.push(ResolvedCase::new(
            Action::Add,
            effective.create.is_allowed(),
            request,
        ));
    }

    if effective.read.is_set() {
        cases.push(ResolvedCase::new(
            Action::Query,
            effective.read.is_allowed(),
            request,
        ));
    }

    // Update and delete are generated even when undeclared; unset means denied.
    cases.push(ResolvedCase::new(
        Action::Update,
        effective.update.is_allowed(),
        request,
    ));
    cases.push(ResolvedCase::new(
        Action::Delete,
        effective.delete.is_allowed(),
        request,
    ));

    if request.set_payload.is_some() {
        let gated = view.gated(Action::Set)?;
        cases.push(ResolvedCase::new(
            Action::Set,
            gated.create.is_allowed(),
            request,
        ));
    }

    if effective.list.is_set() {
        let gated = view.gated(Action::List)?;
        cases.push(ResolvedCase::new(
            Action::List,
            gated.list.is_allowed(),
            request,
        ));
    }

    if effective.get.is_set() {
        let gated = view.gated(Action::Get)?;
        cases.push(ResolvedCase::new(Action::Get, gated.get.is_allowed(), request));
    }

    Ok(cases)
}
