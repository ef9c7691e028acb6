//! Persistence error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a [`PersistenceGateway`](super::PersistenceGateway)
#[derive(Debug, Error)]
pub enum StoreError {
	/// A row with the same unique key but different content exists. Treated as a concurrent
	/// write by another task.
	#[error("Duplicate key {key}: {context}")]
	DuplicateKey {
		key: String,
		context: Box<ErrorContext>,
	},

	/// The store cannot be reached
	#[error("Store unavailable: {0}")]
	StoreUnavailable(Box<ErrorContext>),
}

impl StoreError {
	/// Creates a DuplicateKey error. Not logged: the callers treat it as benign.
	pub fn duplicate_key(
		key: impl Into<String>,
		msg: impl Into<String>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DuplicateKey {
			key: key.into(),
			context: Box::new(ErrorContext::new(msg, None, metadata)),
		}
	}

	/// Creates a StoreUnavailable error
	pub fn store_unavailable(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StoreUnavailable(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn is_duplicate_key(&self) -> bool {
		matches!(self, Self::DuplicateKey { .. })
	}

	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::StoreUnavailable(_))
	}
}

impl TraceableError for StoreError {
	fn trace_id(&self) -> String {
		match self {
			Self::DuplicateKey { context, .. } => context.trace_id.clone(),
			Self::StoreUnavailable(context) => context.trace_id.clone(),
		}
	}
}
