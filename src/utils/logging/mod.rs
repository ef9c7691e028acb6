//! Logging setup.
//!
//! The filter is read from `RUST_LOG`, then `LOG_LEVEL`, defaulting to `info`.
//! `LOG_FORMAT=json` selects structured JSON output, anything else the compact text format.

pub mod error;

use std::env;
use tracing_subscriber::EnvFilter;

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
	Compact,
	Json,
}

impl LogFormat {
	fn from_env() -> Self {
		match env::var("LOG_FORMAT") {
			Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
			_ => LogFormat::Compact,
		}
	}
}

fn build_filter() -> Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> {
	if let Ok(filter) = EnvFilter::try_from_default_env() {
		return Ok(filter);
	}
	let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
	Ok(EnvFilter::try_new(level)?)
}

/// Installs the global tracing subscriber.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error + Send + Sync>>` - Error if a subscriber is already set
///   or the filter directive is invalid
pub fn setup_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
	let filter = build_filter()?;
	match LogFormat::from_env() {
		LogFormat::Json => tracing_subscriber::fmt()
			.json()
			.with_env_filter(filter)
			.with_target(true)
			.try_init(),
		LogFormat::Compact => tracing_subscriber::fmt()
			.compact()
			.with_env_filter(filter)
			.with_target(true)
			.try_init(),
	}
}
