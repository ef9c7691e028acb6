//! Notifications emitted by the sync engines.

use std::sync::Arc;

use crate::models::{Block, Transaction};

/// Event delivered to engine subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
	/// A block was persisted
	Block(Arc<Block>),
	/// An unconfirmed transaction was persisted
	Transaction(Arc<Transaction>),
	/// The history backfill closed every gap up to `height`
	End { height: u64 },
}
