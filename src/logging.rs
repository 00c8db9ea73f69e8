// ABOUTME: tracing-subscriber setup for the tether binary.
// ABOUTME: Logs go to stderr so the console transcript on stdout stays clean.

use tether_core::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter() -> EnvFilter {
    // Default to warnings only; the console itself is the primary output
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,tether=info".into())
}

pub fn init(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter());
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
