//! TOML suite configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rulecheck_core::{
    CapabilitySet, FeatureFlagContext, FlagError, FlagSensitiveCollections, Persona,
    PersonaCapabilities, PersonaCatalog, ScenarioMatrix, ScenarioRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{AuthClaims, EmulatorSession};

const DEFAULT_EMULATOR_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_CASE_TIMEOUT_MS: u64 = 10_000;

/// Errors loading or validating a suite file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read suite file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse suite file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid suite: {message}")]
    Invalid { message: String },

    #[error(transparent)]
    Flag(#[from] FlagError),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Flag-gated capability pair of a persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatedCapabilities {
    #[serde(default)]
    pub on: CapabilitySet,
    #[serde(default)]
    pub off: CapabilitySet,
}

/// One `[[personas]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    pub label: String,
    /// Signed-in user's claims, e.g. `{ uid = "uid" }`; absent for the
    /// anonymous persona.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitySet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_dashboard: Option<GatedCapabilities>,
}

impl PersonaConfig {
    /// Claims for the persona's ID token; `None` for the anonymous persona.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `auth` lacks a non-empty string
    /// `uid`.
    pub fn auth_claims(&self) -> Result<Option<AuthClaims>, ConfigError> {
        self.auth
            .as_ref()
            .map(|auth| {
                AuthClaims::from_user(&serde_json::Value::Object(auth.clone())).ok_or_else(|| {
                    ConfigError::invalid(format!(
                        "persona '{}' auth needs a non-empty string uid",
                        self.label
                    ))
                })
            })
            .transpose()
    }

    /// The declared capability shape.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] unless exactly one of `capabilities`
    /// or `public_dashboard` is present.
    pub fn capabilities(&self) -> Result<PersonaCapabilities, ConfigError> {
        match (&self.capabilities, &self.public_dashboard) {
            (Some(flat), None) => Ok(PersonaCapabilities::Flat(*flat)),
            (None, Some(gated)) => Ok(PersonaCapabilities::Gated {
                on: gated.on,
                off: gated.off,
            }),
            (Some(_), Some(_)) => Err(ConfigError::invalid(format!(
                "persona '{}' declares both capabilities and public_dashboard",
                self.label
            ))),
            (None, None) => Err(ConfigError::invalid(format!(
                "persona '{}' declares neither capabilities nor public_dashboard",
                self.label
            ))),
        }
    }
}

/// A whole conformance run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    #[serde(default = "default_emulator_url")]
    pub emulator_url: String,
    /// Emulator project; `rules-spec-<unix millis>` when omitted.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_case_timeout_ms")]
    pub case_timeout_ms: u64,
    /// Overrides the built-in flag-sensitive collection set.
    #[serde(default)]
    pub flag_sensitive_collections: Option<FlagSensitiveCollections>,
    /// Seed documents keyed by `collection/id` path.
    #[serde(default)]
    pub documents: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioRequest>,
}

fn default_emulator_url() -> String {
    DEFAULT_EMULATOR_URL.to_string()
}

const fn default_case_timeout_ms() -> u64 {
    DEFAULT_CASE_TIMEOUT_MS
}

impl SuiteConfig {
    /// Read, parse and validate a suite file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::parse_str(&raw)?;
        debug!(path = %path.display(), personas = config.personas.len(), scenarios = config.scenarios.len(), "loaded suite");
        Ok(config)
    }

    /// Parse and validate suite TOML, fixing the project id if omitted.
    pub fn parse_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw)?;
        if config.project_id.is_none() {
            config.project_id = Some(format!("rules-spec-{}", Utc::now().timestamp_millis()));
        }
        config.validate()?;
        Ok(config)
    }

    /// Check structural constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.emulator_url).map_err(|err| {
            ConfigError::invalid(format!("emulator_url '{}': {err}", self.emulator_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(format!(
                "emulator_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.project_id.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid("project_id must not be empty"));
        }
        if self.case_timeout_ms == 0 {
            return Err(ConfigError::invalid("case_timeout_ms must be positive"));
        }

        let mut labels = std::collections::BTreeSet::new();
        for persona in &self.personas {
            if persona.label.trim().is_empty() {
                return Err(ConfigError::invalid("persona label must not be empty"));
            }
            if !labels.insert(persona.label.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate persona label '{}'",
                    persona.label
                )));
            }
            persona.capabilities()?;
            persona.auth_claims()?;
        }

        for scenario in &self.scenarios {
            if scenario.collection.is_empty() || scenario.collection.contains('/') {
                return Err(ConfigError::invalid(format!(
                    "scenario collection '{}' must be a single non-empty segment",
                    scenario.collection
                )));
            }
            if scenario.target_id().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "scenario '{}' has an empty target_id",
                    scenario.collection
                )));
            }
        }
        Ok(())
    }

    /// Project id in effect for this run.
    #[must_use]
    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub const fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }

    #[must_use]
    pub fn flag_sensitive(&self) -> FlagSensitiveCollections {
        self.flag_sensitive_collections.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn matrix(&self) -> ScenarioMatrix {
        ScenarioMatrix::new(self.flag_sensitive())
    }

    /// Read the public dashboard flag once from the seed documents.
    ///
    /// A missing configuration document is an error only when some scenario
    /// targets a flag-sensitive collection; otherwise the flag reads as off.
    pub fn feature_flags(&self) -> Result<FeatureFlagContext, ConfigError> {
        match FeatureFlagContext::from_documents(&self.documents) {
            Ok(flags) => Ok(flags),
            Err(FlagError::MissingDocument { .. }) if !self.needs_flag() => {
                Ok(FeatureFlagContext::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn needs_flag(&self) -> bool {
        let sensitive = self.flag_sensitive();
        self.scenarios
            .iter()
            .any(|scenario| sensitive.contains(&scenario.collection))
    }

    /// Build the persona catalog with one emulator session per persona.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a persona with an invalid
    /// capability shape or auth table; no persona is silently dropped.
    pub fn personas(&self, client: &reqwest::Client) -> Result<PersonaCatalog, ConfigError> {
        self.personas
            .iter()
            .map(|persona| {
                let capabilities = persona.capabilities()?;
                let claims = persona.auth_claims()?;
                let session = EmulatorSession::new(
                    client.clone(),
                    &self.emulator_url,
                    self.project_id(),
                    claims.as_ref(),
                );
                Ok(Persona::new(persona.label.clone(), Arc::new(session), capabilities))
            })
            .collect()
    }
}
