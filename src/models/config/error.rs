//! Configuration error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
	/// A value failed validation
	#[error("Validation error: {0}")]
	ValidationError(Box<ErrorContext>),

	/// The file could not be parsed
	#[error("Parse error: {0}")]
	ParseError(Box<ErrorContext>),

	/// The file could not be read
	#[error("File error: {0}")]
	FileError(Box<ErrorContext>),
}

impl ConfigError {
	/// Creates a validation error
	pub fn validation_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ValidationError(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	/// Creates a parse error
	pub fn parse_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ParseError(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	/// Creates a file error
	pub fn file_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::FileError(Box::new(ErrorContext::new(msg, source, metadata)))
	}
}

impl TraceableError for ConfigError {
	fn trace_id(&self) -> String {
		match self {
			Self::ValidationError(context) => context.trace_id.clone(),
			Self::ParseError(context) => context.trace_id.clone(),
			Self::FileError(context) => context.trace_id.clone(),
		}
	}
}
