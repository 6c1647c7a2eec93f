//! Capability tables.
//!
//! A persona declares, per operation, whether the rule engine is expected to
//! allow it. A missing entry is meaningful: for read/list/get it means "do not
//! generate a case at all", which is why [`Permission`] is tri-state rather
//! than a `bool`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FeatureFlagContext, ResolutionError};

/// The six operations a capability table can speak about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Get,
}

impl Operation {
    /// All operations in table order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::List,
        Self::Get,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Get => "get",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete backend call used to exercise an [`Operation`].
///
/// `create` is exercised two ways (auto-id add and set-at-id), and `read` and
/// `list` both issue a collection query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Add a document with a backend-assigned id.
    Add,
    /// Query the whole collection.
    Query,
    /// Update an existing document.
    Update,
    /// Delete a document.
    Delete,
    /// Write a document at a fixed id.
    Set,
    /// Query the whole collection, judged by the `list` capability.
    List,
    /// Fetch a single document.
    Get,
}

impl Action {
    /// Operation whose capability decides this action's expected outcome.
    #[must_use]
    pub const fn operation(self) -> Operation {
        match self {
            Self::Add | Self::Set => Operation::Create,
            Self::Query => Operation::Read,
            Self::Update => Operation::Update,
            Self::Delete => Operation::Delete,
            Self::List => Operation::List,
            Self::Get => Operation::Get,
        }
    }

    /// Gerund phrase used in case descriptions.
    #[must_use]
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::Add => "creating a document",
            Self::Query => "reading the collection",
            Self::Update => "updating a document",
            Self::Delete => "deleting a document",
            Self::Set => "creating a document at a fixed id",
            Self::List => "listing the collection",
            Self::Get => "reading a single document",
        }
    }

    /// Whether the action addresses a single document id.
    #[must_use]
    pub const fn targets_document(self) -> bool {
        matches!(self, Self::Update | Self::Delete | Self::Set | Self::Get)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Query => "query",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Set => "set",
            Self::List => "list",
            Self::Get => "get",
        };
        f.write_str(name)
    }
}

/// Tri-state permission for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Permission {
    /// Not declared for this collection.
    #[default]
    Unset,
    Allowed,
    Denied,
}

impl Permission {
    /// Whether the key was declared at all.
    #[must_use]
    pub const fn is_set(self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Whether the operation is expected to succeed. `Unset` counts as denied.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl From<Option<bool>> for Permission {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Unset,
            Some(true) => Self::Allowed,
            Some(false) => Self::Denied,
        }
    }
}

impl From<Permission> for Option<bool> {
    fn from(value: Permission) -> Self {
        match value {
            Permission::Unset => None,
            Permission::Allowed => Some(true),
            Permission::Denied => Some(false),
        }
    }
}

/// Per-operation permissions for one persona on one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilitySet {
    #[serde(skip_serializing_if = "is_unset")]
    pub create: Permission,
    #[serde(skip_serializing_if = "is_unset")]
    pub read: Permission,
    #[serde(skip_serializing_if = "is_unset")]
    pub update: Permission,
    #[serde(skip_serializing_if = "is_unset")]
    pub delete: Permission,
    #[serde(skip_serializing_if = "is_unset")]
    pub list: Permission,
    #[serde(skip_serializing_if = "is_unset")]
    pub get: Permission,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_unset(permission: &Permission) -> bool {
    !permission.is_set()
}

impl CapabilitySet {
    /// A set with every key unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub const fn with(mut self, operation: Operation, allowed: bool) -> Self {
        let permission = if allowed {
            Permission::Allowed
        } else {
            Permission::Denied
        };
        match operation {
            Operation::Create => self.create = permission,
            Operation::Read => self.read = permission,
            Operation::Update => self.update = permission,
            Operation::Delete => self.delete = permission,
            Operation::List => self.list = permission,
            Operation::Get => self.get = permission,
        }
        self
    }

    /// Permission declared for `operation`.
    #[must_use]
    pub const fn permission(&self, operation: Operation) -> Permission {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::List => self.list,
            Operation::Get => self.get,
        }
    }
}

/// Shape of a persona's capability declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityShape {
    Flat,
    Gated,
}

impl fmt::Display for CapabilityShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Gated => f.write_str("flag-gated"),
        }
    }
}

/// A persona's full capability declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaCapabilities {
    /// One set, used for collections that ignore the feature flag.
    Flat(CapabilitySet),
    /// One set per feature-flag state.
    Gated {
        on: CapabilitySet,
        off: CapabilitySet,
    },
}

impl PersonaCapabilities {
    /// Shape of this declaration.
    #[must_use]
    pub const fn shape(&self) -> CapabilityShape {
        match self {
            Self::Flat(_) => CapabilityShape::Flat,
            Self::Gated { .. } => CapabilityShape::Gated,
        }
    }

    /// The set selected by the flag state, or `None` for a flat declaration.
    #[must_use]
    pub const fn gated(&self, flags: FeatureFlagContext) -> Option<&CapabilitySet> {
        match self {
            Self::Flat(_) => None,
            Self::Gated { on, off } => {
                if flags.public_dashboard_enabled() {
                    Some(on)
                } else {
                    Some(off)
                }
            }
        }
    }
}

/// The two capability accessors used during resolution.
///
/// Most cases are judged against [`CapabilityView::effective`]. The upsert,
/// list and get cases are judged against [`CapabilityView::gated`] instead.
/// The two are kept apart on purpose: for flag-sensitive collections they
/// select the same set, but a flat persona has no gated set at all.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityView<'a> {
    persona: &'a str,
    effective: &'a CapabilitySet,
    gated: Option<&'a CapabilitySet>,
}

impl<'a> CapabilityView<'a> {
    /// Select the view for a persona against a collection.
    ///
    /// # Errors
    /// Returns [`ResolutionError::ShapeMismatch`] when the declaration's shape
    /// disagrees with `flag_sensitive`.
    pub fn select(
        persona: &'a str,
        collection: &str,
        capabilities: &'a PersonaCapabilities,
        flag_sensitive: bool,
        flags: FeatureFlagContext,
    ) -> Result<Self, ResolutionError> {
        let expected = if flag_sensitive {
            CapabilityShape::Gated
        } else {
            CapabilityShape::Flat
        };
        let mismatch = || ResolutionError::ShapeMismatch {
            persona: persona.to_string(),
            collection: collection.to_string(),
            expected,
            actual: capabilities.shape(),
        };

        match (capabilities, flag_sensitive) {
            (PersonaCapabilities::Flat(set), false) => Ok(Self {
                persona,
                effective: set,
                gated: None,
            }),
            (PersonaCapabilities::Gated { .. }, true) => {
                let selected = capabilities.gated(flags).ok_or_else(mismatch)?;
                Ok(Self {
                    persona,
                    effective: selected,
                    gated: Some(selected),
                })
            }
            _ => Err(mismatch()),
        }
    }

    /// Set selected for this collection and flag state.
    #[must_use]
    pub const fn effective(&self) -> &'a CapabilitySet {
        self.effective
    }

    /// Flag-gated set, read directly for the `set`, `list` and `get` actions.
    ///
    /// # Errors
    /// Returns [`ResolutionError::GatedSetRequired`] for flat personas.
    pub fn gated(&self, action: Action) -> Result<&'a CapabilitySet, ResolutionError> {
        self.gated.ok_or_else(|| ResolutionError::GatedSetRequired {
            persona: self.persona.to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_from_optional_bool() {
        assert_eq!(Permission::from(None), Permission::Unset);
        assert_eq!(Permission::from(Some(true)), Permission::Allowed);
        assert_eq!(Permission::from(Some(false)), Permission::Denied);
        assert!(!Permission::Unset.is_allowed());
        assert!(Permission::Denied.is_set());
    }

    #[test]
    fn capability_set_distinguishes_absent_from_false() {
        let set: CapabilitySet = serde_json::from_str(r#"{"read": false}"#).unwrap();
        assert_eq!(set.read, Permission::Denied);
        assert_eq!(set.list, Permission::Unset);

        let back = serde_json::to_value(set).unwrap();
        assert_eq!(back, serde_json::json!({"read": false}));
    }

    #[test]
    fn capability_set_rejects_unknown_keys() {
        let result: Result<CapabilitySet, _> = serde_json::from_str(r#"{"write": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn builder_sets_permissions() {
        let set = CapabilitySet::new()
            .with(Operation::Create, true)
            .with(Operation::Delete, false);
        assert_eq!(set.permission(Operation::Create), Permission::Allowed);
        assert_eq!(set.permission(Operation::Delete), Permission::Denied);
        assert_eq!(set.permission(Operation::Get), Permission::Unset);
    }

    #[test]
    fn every_operation_has_its_own_slot() {
        for operation in Operation::ALL {
            let set = CapabilitySet::new().with(operation, true);
            for other in Operation::ALL {
                let expected = if other == operation {
                    Permission::Allowed
                } else {
                    Permission::Unset
                };
                assert_eq!(set.permission(other), expected, "{operation} vs {other}");
            }
            let key = serde_json::to_value(set).unwrap();
            assert_eq!(key, serde_json::json!({ operation.as_str(): true }));
        }
    }

    #[test]
    fn action_maps_to_operation() {
        assert_eq!(Action::Add.operation(), Operation::Create);
        assert_eq!(Action::Set.operation(), Operation::Create);
        assert_eq!(Action::Query.operation(), Operation::Read);
        assert_eq!(Action::List.operation(), Operation::List);
        assert!(Action::Get.targets_document());
        assert!(!Action::Query.targets_document());
    }

    #[test]
    fn view_rejects_shape_mismatch() {
        let flat = PersonaCapabilities::Flat(CapabilitySet::new());
        let err = CapabilityView::select(
            "owner",
            "projects",
            &flat,
            true,
            FeatureFlagContext::new(true),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::ShapeMismatch {
                expected: CapabilityShape::Gated,
                actual: CapabilityShape::Flat,
                ..
            }
        ));

        let gated = PersonaCapabilities::Gated {
            on: CapabilitySet::new(),
            off: CapabilitySet::new(),
        };
        assert!(
            CapabilityView::select("owner", "other", &gated, false, FeatureFlagContext::new(false))
                .is_err()
        );
    }

    #[test]
    fn view_selects_by_flag_state() {
        let caps = PersonaCapabilities::Gated {
            on: CapabilitySet::new().with(Operation::Read, false),
            off: CapabilitySet::new().with(Operation::Read, true),
        };
        let on = CapabilityView::select("p", "build", &caps, true, FeatureFlagContext::new(true))
            .unwrap();
        let off = CapabilityView::select("p", "build", &caps, true, FeatureFlagContext::new(false))
            .unwrap();
        assert_eq!(on.effective().read, Permission::Denied);
        assert_eq!(off.effective().read, Permission::Allowed);
        assert_eq!(on.gated(Action::List).unwrap().read, Permission::Denied);
    }

    #[test]
    fn flat_view_has_no_gated_set() {
        let caps = PersonaCapabilities::Flat(CapabilitySet::new());
        let view =
            CapabilityView::select("p", "other", &caps, false, FeatureFlagContext::new(true))
                .unwrap();
        let err = view.gated(Action::Get).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::GatedSetRequired {
                persona: "p".to_string(),
                action: Action::Get,
            }
        );
    }
}
