//! `tracing` subscriber setup driven by the `debug_level` config key.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a global `tracing` subscriber once per process.
///
/// Safe to call from every `Session::open` -- subsequent calls are no-ops, matching
/// the teacher's `Once`-guarded subsystem init pattern.
pub fn init(debug_level: &str) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_new(debug_level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
