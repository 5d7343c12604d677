use super::config::{LogFormat, LogVerbosity};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives appended to the configured level to quiet chatty dependencies.
const DEPENDENCY_DIRECTIVES: &str = "tokio=warn,runtime=warn";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to everything except
/// the dependencies listed above. Returns `false` if a global subscriber was
/// already installed, which makes repeated calls harmless.
pub fn init_tracing(level: LogVerbosity, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{DEPENDENCY_DIRECTIVES}")));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(filter)
            .try_init(),
    };

    result.is_ok()
}
