//! Transport error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the wire layer
#[derive(Debug, Error)]
pub enum TransportError {
	/// Non-success HTTP status
	#[error("HTTP error: status {status_code} for URL {url}")]
	Http {
		status_code: u16,
		url: String,
		body: String,
		context: Box<ErrorContext>,
	},

	/// Connection or I/O failure
	#[error("Network error: {0}")]
	Network(Box<ErrorContext>),

	/// The reply was not valid JSON-RPC
	#[error("Failed to parse JSON response: {0}")]
	ResponseParse(Box<ErrorContext>),

	/// The connection was closed while a request was in flight
	#[error("Connection closed: {0}")]
	Closed(Box<ErrorContext>),

	/// The endpoint URI cannot be served on this platform
	#[error("Unsupported transport: {0}")]
	UnsupportedTransport(Box<ErrorContext>),
}

impl TransportError {
	/// Creates an HTTP error
	pub fn http(
		status_code: u16,
		url: impl Into<String>,
		body: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let url = url.into();
		let message = format!("HTTP error: status {} for URL {}", status_code, &url);
		Self::Http {
			status_code,
			url,
			body: body.into(),
			context: Box::new(ErrorContext::new(message, source, metadata)),
		}
	}

	/// Creates a network error
	pub fn network(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Network(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	/// Creates a response parse error
	pub fn response_parse(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseParse(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	/// Creates a connection closed error
	pub fn closed(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Closed(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	/// Creates an unsupported transport error
	pub fn unsupported_transport(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UnsupportedTransport(Box::new(ErrorContext::new(msg, source, metadata)))
	}

	pub fn is_closed(&self) -> bool {
		matches!(self, Self::Closed(_))
	}
}

impl TraceableError for TransportError {
	fn trace_id(&self) -> String {
		match self {
			Self::Http { context, .. } => context.trace_id.clone(),
			Self::Network(context) => context.trace_id.clone(),
			Self::ResponseParse(context) => context.trace_id.clone(),
			Self::Closed(context) => context.trace_id.clone(),
			Self::UnsupportedTransport(context) => context.trace_id.clone(),
		}
	}
}
