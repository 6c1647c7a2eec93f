//! Error types shared by the resolution and execution phases.
//!
//! Three families:
//! - [`ResolutionError`]: a persona cannot be resolved against a request
//!   (precondition violation, raised before any backend call)
//! - [`BackendError`]: a backend operation did not complete successfully
//! - [`FlagError`]: the feature-flag configuration document is unusable

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Action, CapabilityShape};

/// Result alias for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Persona/request combination that cannot be resolved into cases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The persona's capability shape disagrees with the collection's
    /// flag-sensitivity.
    #[error(
        "persona '{persona}' declares {actual} capabilities but collection '{collection}' requires {expected}"
    )]
    ShapeMismatch {
        persona: String,
        collection: String,
        expected: CapabilityShape,
        actual: CapabilityShape,
    },

    /// An action reads the flag-gated capability set, which a flat persona
    /// does not have.
    #[error("persona '{persona}' has no flag-gated capabilities for the {action} case")]
    GatedSetRequired { persona: String, action: Action },
}

/// Failure of a single backend operation.
///
/// Only [`BackendError::Denied`] is the rule engine's rejection signal; the
/// other variants mean the operation never reached a rule decision.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("permission denied: {message}")]
    Denied { message: String },

    #[error("malformed request: {message}")]
    Malformed { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl BackendError {
    /// Create a denial error.
    #[must_use]
    pub fn denied(message: impl Into<String>) -> Self {
        Self::Denied {
            message: message.into(),
        }
    }

    /// Create a malformed-request error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether this error is the rule engine rejecting the operation.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// Feature-flag document errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    #[error("feature flag document '{path}' not found")]
    MissingDocument { path: String },

    #[error("feature flag document '{path}' has no boolean field '{field}'")]
    InvalidField { path: String, field: String },
}
