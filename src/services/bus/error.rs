//! Message bus error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by an [`EventBus`](super::EventBus)
#[derive(Debug, Error)]
pub enum BusError {
	/// The broker connection is gone
	#[error("Broker unavailable: {0}")]
	BrokerUnavailable(Box<ErrorContext>),

	/// A payload could not be encoded
	#[error("Serialization error: {0}")]
	Serialization(Box<ErrorContext>),
}

impl BusError {
	/// Creates a BrokerUnavailable error
	pub fn broker_unavailable(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::BrokerUnavailable(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	/// Creates a Serialization error
	pub fn serialization(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::Serialization(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}

	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::BrokerUnavailable(_))
	}
}

impl TraceableError for BusError {
	fn trace_id(&self) -> String {
		match self {
			Self::BrokerUnavailable(context) => context.trace_id.clone(),
			Self::Serialization(context) => context.trace_id.clone(),
		}
	}
}
