//! Logging setup shared by every binary in the workspace.
//!
//! One initializer, called at startup (the integration tests call it too;
//! repeat calls are no-ops). Output is JSON lines so a garage deployment's
//! log shipper gets structured records without a parsing step.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Initialize process-wide logging. Safe to call more than once; only the
/// first call installs the subscriber.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Initialize with an explicit fallback filter, e.g.
/// `"garagekit_infra=debug,info"` to watch dispatches. `RUST_LOG` still
/// wins when set.
pub fn init_with_filter(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
