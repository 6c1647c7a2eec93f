//! rulecheck core: capability tables, personas and scenario resolution.
//!
//! This crate holds the pure part of an access-rule conformance run:
//!
//! - [`CapabilitySet`] / [`PersonaCapabilities`]: what each persona is expected
//!   to be allowed to do, flat or gated on the public dashboard flag
//! - [`Persona`] / [`PersonaCatalog`]: named actors with a backend session
//! - [`ScenarioMatrix`]: resolves a persona and a [`ScenarioRequest`] into an
//!   ordered list of [`ResolvedCase`]s
//! - [`BackendSession`]: the seam to the rule-enforcing backend

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod capability;
mod error;
mod flag;
mod persona;
mod scenario;
mod session;

pub use capability::*;
pub use error::*;
pub use flag::*;
pub use persona::*;
pub use scenario::*;
pub use session::*;

pub use async_trait::async_trait;
