//! Sync engine errors and control signals.

use crate::{
	services::{blockchain::BlockChainError, bus::BusError, storage::StoreError},
	utils::logging::error::TraceableError,
};
use thiserror::Error;

/// Why a live tail step did not advance the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncInterrupt {
	/// The upstream has no block past the cursor yet
	WaitForNextBlock,
	/// The upstream node is still bootstrapping
	NotYetSynced,
	/// The persisted history diverged from the upstream at or above `height`
	ReorgDetected { height: u64 },
}

/// Errors raised by the sync engines
#[derive(Debug, Error)]
pub enum SyncError {
	#[error("Upstream error: {0}")]
	Upstream(#[from] BlockChainError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Bus error: {0}")]
	Bus(#[from] BusError),
}

impl SyncError {
	/// Whether the engine must stop and the process exit
	pub fn is_fatal(&self) -> bool {
		match self {
			Self::Upstream(e) => e.is_fatal(),
			Self::Store(e) => e.is_fatal(),
			Self::Bus(e) => e.is_fatal(),
		}
	}
}

impl TraceableError for SyncError {
	fn trace_id(&self) -> String {
		match self {
			Self::Upstream(e) => e.trace_id(),
			Self::Store(e) => e.trace_id(),
			Self::Bus(e) => e.trace_id(),
		}
	}
}
