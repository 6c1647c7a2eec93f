//! Feature-flag context and the collections it affects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::FlagError;

/// Path of the configuration document holding the feature flags.
pub const FEATURE_CONFIG_PATH: &str = "feature_config/feature_config";

/// Field of [`FEATURE_CONFIG_PATH`] toggling the public dashboard.
pub const PUBLIC_DASHBOARD_FIELD: &str = "isPublicDashboardEnabled";

/// Collections whose rules depend on the public dashboard flag.
pub const DEFAULT_FLAG_SENSITIVE_COLLECTIONS: [&str; 5] = [
    "project_groups",
    "projects",
    "build_days",
    "build",
    "user_profiles",
];

/// Read-only snapshot of the feature flags for one resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureFlagContext {
    public_dashboard_enabled: bool,
}

impl FeatureFlagContext {
    #[must_use]
    pub const fn new(public_dashboard_enabled: bool) -> Self {
        Self {
            public_dashboard_enabled,
        }
    }

    /// Whether the public dashboard is enabled.
    #[must_use]
    pub const fn public_dashboard_enabled(self) -> bool {
        self.public_dashboard_enabled
    }

    /// `"on"` or `"off"`, as used in case group titles and logs.
    #[must_use]
    pub const fn state_name(self) -> &'static str {
        if self.public_dashboard_enabled {
            "on"
        } else {
            "off"
        }
    }

    /// Read the flag from the feature configuration document itself.
    ///
    /// # Errors
    /// Returns [`FlagError::InvalidField`] if the field is missing or not a
    /// boolean.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, FlagError> {
        document
            .get(PUBLIC_DASHBOARD_FIELD)
            .and_then(serde_json::Value::as_bool)
            .map(Self::new)
            .ok_or_else(|| FlagError::InvalidField {
                path: FEATURE_CONFIG_PATH.to_string(),
                field: PUBLIC_DASHBOARD_FIELD.to_string(),
            })
    }

    /// Read the flag from a map of documents keyed by path, the same layout
    /// used to seed a backend.
    ///
    /// # Errors
    /// Returns [`FlagError::MissingDocument`] if the configuration document is
    /// absent, or [`FlagError::InvalidField`] if it is malformed.
    pub fn from_documents<'a, I>(documents: I) -> Result<Self, FlagError>
    where
        I: IntoIterator<Item = (&'a String, &'a serde_json::Value)>,
    {
        let document = documents
            .into_iter()
            .find_map(|(path, doc)| (path == FEATURE_CONFIG_PATH).then_some(doc))
            .ok_or_else(|| FlagError::MissingDocument {
                path: FEATURE_CONFIG_PATH.to_string(),
            })?;
        Self::from_document(document)
    }
}

/// Set of collection names resolved against flag-gated capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSensitiveCollections(BTreeSet<String>);

impl FlagSensitiveCollections {
    /// Build from an explicit list of collection names.
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(collections.into_iter().map(Into::into).collect())
    }

    /// Whether `collection` is flag-sensitive.
    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.0.contains(collection)
    }

    /// Iterate the collection names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for FlagSensitiveCollections {
    fn default() -> Self {
        Self::new(DEFAULT_FLAG_SENSITIVE_COLLECTIONS)
    }
}
