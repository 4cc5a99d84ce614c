//! Shared test plumbing.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Install a test subscriber once per process. Respects `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
