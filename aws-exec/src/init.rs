//! Tracing setup
//!
//! Logs go to stderr so stdout stays free for the CLI. `RUST_LOG` replaces
//! the default filter entirely; `LOG_FORMAT=json` switches to JSON lines.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset. Keeps request traces from the
/// `TraceLayer` alongside this crate's own events.
pub const DEFAULT_LOG_FILTER: &str = "aws_exec=info,tower_http=info";

/// Output format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Text)
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Install the global subscriber for the `aws-exec` binary
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::new(DEFAULT_LOG_FILTER),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match LogFormat::from_env() {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
