//! Error context shared by every service error type.
//!
//! Each error variant in the crate carries a boxed [`ErrorContext`] so that a failure can be
//! correlated across log lines through its trace id.

use chrono::Utc;
use std::{collections::HashMap, fmt};
use uuid::Uuid;

/// Context attached to an error: message, optional source, metadata and a trace id.
#[derive(Debug)]
pub struct ErrorContext {
	/// Human readable description of the failure
	pub message: String,
	/// Underlying error, if any
	pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
	/// Unique identifier used to correlate log lines
	pub trace_id: String,
	/// RFC 3339 timestamp of when the error was created
	pub timestamp: String,
	/// Extra key/value pairs (endpoint, block number, ...)
	pub metadata: Option<HashMap<String, String>>,
}

impl ErrorContext {
	/// Creates a new error context without logging it.
	///
	/// # Arguments
	/// * `message` - Description of the failure
	/// * `source` - Optional underlying error
	/// * `metadata` - Optional key/value pairs
	pub fn new(
		message: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self {
			message: message.into(),
			source,
			trace_id: Uuid::new_v4().to_string(),
			timestamp: Utc::now().to_rfc3339(),
			metadata,
		}
	}

	/// Creates a new error context and emits it as an error log line.
	pub fn new_with_log(
		message: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let context = Self::new(message, source, metadata);
		log_error(&context);
		context
	}

	/// Adds a single metadata entry.
	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata
			.get_or_insert_with(HashMap::new)
			.insert(key.into(), value.into());
		self
	}

	/// Formats the message followed by the sorted metadata entries.
	pub fn format_with_metadata(&self) -> String {
		let mut result = self.message.clone();
		if let Some(metadata) = &self.metadata {
			let mut entries: Vec<_> = metadata.iter().collect();
			entries.sort();
			for (key, value) in entries {
				result.push_str(&format!(" [{}={}]", key, value));
			}
		}
		result
	}
}

impl fmt::Display for ErrorContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.format_with_metadata())
	}
}

impl std::error::Error for ErrorContext {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source
			.as_ref()
			.map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
	}
}

/// Errors that expose the trace id of their context
pub trait TraceableError: std::error::Error + Send + Sync {
	fn trace_id(&self) -> String;
}

fn log_error(context: &ErrorContext) {
	let mut chain = Vec::new();
	let mut current = context
		.source
		.as_ref()
		.map(|e| e.as_ref() as &(dyn std::error::Error + 'static));
	while let Some(err) = current {
		chain.push(err.to_string());
		current = err.source();
	}

	tracing::error!(
		trace_id = %context.trace_id,
		timestamp = %context.timestamp,
		error.chain = ?chain,
		"{}",
		context.format_with_metadata()
	);
}
