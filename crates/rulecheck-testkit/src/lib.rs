//! rulecheck test kit: fixtures and fake backends for rule conformance runs.
//!
//! - [`fixtures`]: sample projects, builds and the signed-in user
//! - [`expect_success`] / [`expect_failure`]: the two assertion primitives
//! - [`MemoryBackend`]: deterministic in-memory rule backend with fault
//!   injection
//! - [`RecordingSession`]: wraps a session and records every call
//! - [`MockEmulatorServer`]: wiremock-backed emulator REST surface
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use rulecheck_core::Operation;
//! use rulecheck_testkit::{MemoryBackend, assert_fails, assert_succeeds, fixtures};
//!
//! #[tokio::test]
//! async fn owner_can_create_builds() {
//!     rulecheck_testkit::init_test_tracing();
//!
//!     let backend = MemoryBackend::new().allow(Some("uid"), "build", &[Operation::Create]);
//!     let owner = backend.session(Some("uid"));
//!     let anonymous = backend.session(None);
//!
//!     assert_succeeds(owner.create_document("build", &fixtures::build())).await;
//!     assert_fails(anonymous.create_document("build", &fixtures::build())).await;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assertions;
pub mod fixtures;
mod harness;
mod memory_backend;
mod mock_server;
mod tracing_config;

pub use assertions::*;
pub use harness::*;
pub use memory_backend::*;
pub use mock_server::*;
pub use tracing_config::*;

// Re-export core types for convenience
pub use rulecheck_core::{BackendError, BackendResult, BackendSession};
