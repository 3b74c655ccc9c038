//! Structured logging bootstrap: an env-filter-driven `tracing_subscriber`
//! registry installed exactly once, regardless of how many projects a host
//! process opens.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

/// Installs a global `tracing` subscriber reading `ARCHON_LOG` (falling
/// back to `info`) for its filter directives. Safe to call more than once:
/// only the first call installs anything.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("ARCHON_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(false);
        let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
    });
}
