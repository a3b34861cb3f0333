use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Crate log level for a `-v` count. Warnings (excluded tickers, failed FX sources) always show.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Filter directives for a `-v` count and an optional `RUST_LOG` value.
///
/// Without `RUST_LOG`, dependencies log warnings and the crate follows `verbosity`. A `RUST_LOG`
/// value replaces those defaults entirely; `-v` then only raises the crate's own level on top.
pub fn filter_directives(verbosity: u8, rust_log: Option<&str>) -> String {
    let level = level_for(verbosity).to_string().to_lowercase();
    let crate_directive = format!("{}={level}", env!("CARGO_CRATE_NAME"));
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(rust_log) if verbosity > 0 => format!("{rust_log},{crate_directive}"),
        Some(rust_log) => rust_log.to_string(),
        None => format!("warn,{crate_directive}"),
    }
}

/// Installs the stderr subscriber.
pub fn init_logging(verbosity: u8) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = EnvFilter::new(filter_directives(verbosity, rust_log.as_deref()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .without_time();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
