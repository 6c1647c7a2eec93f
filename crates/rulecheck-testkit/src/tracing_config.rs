//! Tracing configuration for test output.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info,rulecheck_core=debug,rulecheck_conformance=debug";

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// Uses `RUST_LOG` if set.
///
/// # Example
///
/// ```rust,ignore
/// use rulecheck_testkit::init_test_tracing;
///
/// #[tokio::test]
/// async fn my_test() {
///     init_test_tracing();
///     // ... test code
/// }
/// ```
pub fn init_test_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Initialize tracing with a specific filter, ignoring `RUST_LOG`.
pub fn init_test_tracing_with_filter(filter: &str) {
    install(EnvFilter::new(filter));
}

fn install(filter: EnvFilter) {
    INIT.call_once(|| {
        // A subscriber installed by another harness wins; ignore the error.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_ansi(true)
                    .compact(),
            )
            .try_init();
    });
}
