//! rulecheck conformance: plan, execute and report access-rule test runs.
//!
//! A run has two phases. [`TestGenerator::plan`] resolves every persona of a
//! catalog against each scenario and registers the resulting cases without
//! touching the backend. [`TestPlan::execute`] then issues each case's single
//! backend call in registration order and collects a [`SuiteReport`].
//!
//! [`SuiteConfig`] loads a TOML suite file and builds emulator-backed
//! personas; [`run_suite`] chains the two phases for it.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod emulator;
mod generator;
mod report;
mod run_log;

pub use config::*;
pub use emulator::*;
pub use generator::*;
pub use report::*;
pub use run_log::*;

/// Plan and execute every scenario of a loaded suite.
///
/// # Errors
/// Fails before any backend call for the reasons [`plan_suite`] does.
pub async fn run_suite(
    config: &SuiteConfig,
    client: &reqwest::Client,
    filter: Option<String>,
    log: &RunLog,
) -> Result<SuiteReport, ConfigError> {
    let plan = plan_suite(config, client, log)?;
    let mut options = ExecuteOptions::default().with_case_timeout(config.case_timeout());
    options.filter = filter;
    Ok(plan.execute(&options, log).await)
}

/// Register every scenario of a loaded suite without executing anything.
///
/// # Errors
/// Returns [`ConfigError::Invalid`] if a persona or scenario is malformed,
/// and [`ConfigError::Flag`] if the feature flag cannot be read.
pub fn plan_suite(
    config: &SuiteConfig,
    client: &reqwest::Client,
    log: &RunLog,
) -> Result<TestPlan, ConfigError> {
    config.validate()?;
    let personas = config.personas(client)?;
    let flags = config.feature_flags()?;
    let generator = TestGenerator::new(config.matrix(), flags);
    Ok(generator.plan(&personas, &config.scenarios, log))
}
