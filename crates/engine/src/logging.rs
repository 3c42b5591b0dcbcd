//! `tracing`-based logging init. Keeps the teacher's `COMPONENT_KEY`
//! field-naming convention from `engine/src/logging.rs`, applied through
//! `tracing`'s span/field machinery instead of `slog`.

use tracing_subscriber::EnvFilter;

/// Field name every long-running component tags its spans with, so log
/// aggregation can filter by subsystem the way the teacher's slog
/// loggers did with `o!(COMPONENT_KEY => "...")`.
pub const COMPONENT_KEY: &str = "component";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
	Json,
	Pretty,
}

pub fn init(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

	let result = match format {
		LogFormat::Json => subscriber.json().try_init(),
		LogFormat::Pretty => subscriber.pretty().try_init(),
	};

	if let Err(error) = result {
		eprintln!("tracing subscriber already initialized: {error}");
	}
}

#[cfg(test)]
pub fn init_test_logger() {
	let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::new("debug")).with_test_writer().try_init();
}
