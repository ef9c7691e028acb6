//! Notification error types.

use crate::{
	services::{bus::BusError, storage::StoreError},
	utils::logging::error::TraceableError,
};
use thiserror::Error;

/// Errors raised while publishing chain events
#[derive(Debug, Error)]
pub enum NotificationError {
	#[error("Bus error: {0}")]
	Bus(#[from] BusError),

	/// The account registry could not be queried
	#[error("Account registry error: {0}")]
	Registry(#[from] StoreError),
}

impl NotificationError {
	pub fn is_fatal(&self) -> bool {
		match self {
			Self::Bus(e) => e.is_fatal(),
			Self::Registry(e) => e.is_fatal(),
		}
	}
}

impl TraceableError for NotificationError {
	fn trace_id(&self) -> String {
		match self {
			Self::Bus(e) => e.trace_id(),
			Self::Registry(e) => e.trace_id(),
		}
	}
}
