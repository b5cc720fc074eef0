use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global fmt subscriber for a binary.
///
/// `RUST_LOG` wins when it is set and valid, so `RUST_LOG=debug` really shows
/// debug events.
pub fn init() {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    fmt::Subscriber::builder()
        .with_env_filter(filter_from(env.as_deref()))
        .with_target(false)
        .init();
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
