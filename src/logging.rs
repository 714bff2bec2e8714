//! Logging setup for the command-line harness.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(clap::Args, Debug, Clone, Default)]
#[group()]
pub struct LoggingArgs {
    /// Enable debug logging.
    #[arg(long, default_value_t = false, env = "APT_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false, env = "APT_JSON_LOGS")]
    pub json_logs: bool,
}

impl LoggingArgs {
    /// The filter used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Install the global subscriber. Logs go to stderr so stdout stays free
    /// for the run summary.
    pub fn init(&self) {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive()));

        if self.json_logs {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_span_list(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
