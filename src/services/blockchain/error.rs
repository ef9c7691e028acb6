//! Blockchain service error types
//!
//! Classifies upstream failures so the engines can decide between retrying, failing over and
//! shutting down.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the connection pool and the chain reader
#[derive(Debug, Error)]
pub enum BlockChainError {
	/// Every configured endpoint failed to answer
	#[error("No upstream available: {0}")]
	UpstreamUnavailable(Box<ErrorContext>),

	/// The active endpoint failed and a failover was triggered
	#[error("Connection to {endpoint} lost: {context}")]
	ConnectionLost {
		endpoint: String,
		context: Box<ErrorContext>,
	},

	/// A request did not complete within the RPC timeout
	#[error("Request {method} to {endpoint} timed out: {context}")]
	TransientRpcTimeout {
		endpoint: String,
		method: String,
		context: Box<ErrorContext>,
	},

	/// The node answered with a JSON-RPC error object
	#[error("RPC error {code}: {context}")]
	RpcError {
		code: i64,
		context: Box<ErrorContext>,
	},

	/// The reply could not be turned into the domain model
	#[error("Failed to parse RPC response: {0}")]
	ResponseParseError(Box<ErrorContext>),

	/// Parts of one block came from different forks while it was being fetched
	#[error("Block {block_number} changed while it was fetched: {context}")]
	BlockChanged {
		block_number: u64,
		context: Box<ErrorContext>,
	},
}

impl BlockChainError {
	/// Creates an UpstreamUnavailable error
	pub fn upstream_unavailable(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::UpstreamUnavailable(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	/// Creates a ConnectionLost error
	pub fn connection_lost(
		endpoint: impl Into<String>,
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let endpoint = endpoint.into();
		let context = ErrorContext::new_with_log(msg, source, metadata)
			.with_metadata("endpoint", endpoint.clone());
		Self::ConnectionLost {
			endpoint,
			context: Box::new(context),
		}
	}

	/// Creates a TransientRpcTimeout error
	pub fn transient_rpc_timeout(
		endpoint: impl Into<String>,
		method: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let endpoint = endpoint.into();
		let method = method.into();
		let message = format!("{} did not answer {} in time", &endpoint, &method);
		Self::TransientRpcTimeout {
			endpoint,
			method,
			context: Box::new(ErrorContext::new_with_log(message, source, metadata)),
		}
	}

	/// Creates an RPC error
	pub fn rpc_error(
		code: i64,
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RpcError {
			code,
			context: Box::new(ErrorContext::new_with_log(msg, source, metadata)),
		}
	}

	/// Creates a response parse error
	pub fn response_parse_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseParseError(Box::new(ErrorContext::new_with_log(
			msg, source, metadata,
		)))
	}

	/// Creates a BlockChanged error
	pub fn block_changed(
		block_number: u64,
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		let context = ErrorContext::new_with_log(msg, source, metadata)
			.with_metadata("block_number", block_number.to_string());
		Self::BlockChanged {
			block_number,
			context: Box::new(context),
		}
	}

	/// Whether the process can no longer make progress
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::UpstreamUnavailable(_))
	}

	/// Whether retrying the same call after a delay may succeed
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			Self::ConnectionLost { .. }
				| Self::TransientRpcTimeout { .. }
				| Self::BlockChanged { .. }
		)
	}
}

impl TraceableError for BlockChainError {
	fn trace_id(&self) -> String {
		match self {
			Self::UpstreamUnavailable(context) => context.trace_id.clone(),
			Self::ConnectionLost { context, .. } => context.trace_id.clone(),
			Self::TransientRpcTimeout { context, .. } => context.trace_id.clone(),
			Self::RpcError { context, .. } => context.trace_id.clone(),
			Self::ResponseParseError(context) => context.trace_id.clone(),
			Self::BlockChanged { context, .. } => context.trace_id.clone(),
		}
	}
}
