use std::io::IsTerminal;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions<'a> {
    /// Used when `RUST_LOG` is not set.
    pub default_filter: &'a str,
    /// Prefix events with `file:line` of the call site.
    pub source_location: bool,
    pub ansi: bool,
}

impl<'a> LogOptions<'a> {
    /// Source locations follow `LOG_SOURCE`; colours only when stdout is a terminal.
    pub fn from_env(default_filter: &'a str) -> Self {
        let source_location = crate::util::env::env_opt("LOG_SOURCE")
            .and_then(|v| crate::util::env::parse_flag(&v))
            .unwrap_or(false);
        Self {
            default_filter,
            source_location,
            ansi: std::io::stdout().is_terminal(),
        }
    }
}

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
pub fn init_tracing(options: LogOptions<'_>) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(options.ansi)
        .with_file(options.source_location)
        .with_line_number(options.source_location)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
