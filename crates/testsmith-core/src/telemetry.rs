//! Logging for the `testsmith` CLI.
//!
//! Progress events (`request.*`, `unit.*`, `attempt.*`) go to stderr; stdout is
//! left to the JSON results each subcommand prints.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber. `RUST_LOG` overrides `level`; later calls
/// are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let plain = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let structured = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .try_init();
}
