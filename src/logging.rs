use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directives.
pub const LOG_ENV: &str = "DYNGUFUNC_LOG";

/// Install a fmt subscriber filtered by `DYNGUFUNC_LOG` (default `warn`).
///
/// Safe to call more than once; a subscriber installed elsewhere wins.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
