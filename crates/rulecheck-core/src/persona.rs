//! Test actors.

use std::fmt;
use std::sync::Arc;

use crate::{BackendSession, CapabilitySet, PersonaCapabilities, SharedSession};

/// A named actor with a backend session and its expected capabilities.
#[derive(Clone)]
pub struct Persona {
    label: String,
    session: SharedSession,
    capabilities: PersonaCapabilities,
}

impl Persona {
    /// Persona with a single capability set for flag-insensitive collections.
    pub fn flat(
        label: impl Into<String>,
        session: Arc<dyn BackendSession>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self::new(label, session, PersonaCapabilities::Flat(capabilities))
    }

    /// Persona whose capabilities depend on the public dashboard flag.
    pub fn gated(
        label: impl Into<String>,
        session: Arc<dyn BackendSession>,
        on: CapabilitySet,
        off: CapabilitySet,
    ) -> Self {
        Self::new(label, session, PersonaCapabilities::Gated { on, off })
    }

    pub fn new(
        label: impl Into<String>,
        session: Arc<dyn BackendSession>,
        capabilities: PersonaCapabilities,
    ) -> Self {
        Self {
            label: label.into(),
            session,
            capabilities,
        }
    }

    /// Test-group title.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn session(&self) -> &SharedSession {
        &self.session
    }

    #[must_use]
    pub const fn capabilities(&self) -> &PersonaCapabilities {
        &self.capabilities
    }
}

impl fmt::Debug for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persona")
            .field("label", &self.label)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable collection of personas.
#[derive(Debug, Clone, Default)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    #[must_use]
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    /// Append a persona, keeping catalog order.
    #[must_use]
    pub fn with(mut self, persona: Persona) -> Self {
        self.personas.push(persona);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Persona> {
        self.personas.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Find a persona by label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.label == label)
    }
}

impl<'a> IntoIterator for &'a PersonaCatalog {
    type Item = &'a Persona;
    type IntoIter = std::slice::Iter<'a, Persona>;

    fn into_iter(self) -> Self::IntoIter {
        self.personas.iter()
    }
}

impl FromIterator<Persona> for PersonaCatalog {
    fn from_iter<T: IntoIterator<Item = Persona>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
