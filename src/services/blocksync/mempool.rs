//! Mempool watcher.
//!
//! Persists transactions announced by the upstream's pending transaction stream as unconfirmed
//! rows and emits a transaction event for each one.

use std::sync::Arc;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
	models::{ChainEvent, Transaction},
	services::{
		blockchain::ChainReader,
		blocksync::{EventHub, SyncError},
		storage::{BlockWriter, WriteOutcome},
	},
	utils::metrics,
};

/// Follows the pending transaction stream of the active upstream
#[derive(Clone)]
pub struct MempoolWatcher {
	reader: Arc<dyn ChainReader>,
	writer: BlockWriter,
	events: Arc<EventHub>,
	network: String,
	cancel: CancellationToken,
}

impl MempoolWatcher {
	pub fn new(
		reader: Arc<dyn ChainReader>,
		writer: BlockWriter,
		events: Arc<EventHub>,
		network: impl Into<String>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			reader,
			writer,
			events,
			network: network.into(),
			cancel,
		}
	}

	/// Subscribes to the stream and processes it on a new task.
	///
	/// The task ends when the token is cancelled, when the stream closes, or with the first
	/// fatal error.
	pub fn spawn(&self) -> JoinHandle<Result<(), SyncError>> {
		let watcher = self.clone();
		let mut pending = self.reader.pending_transactions();
		tokio::spawn(async move {
			loop {
				let hash = tokio::select! {
					_ = watcher.cancel.cancelled() => return Ok(()),
					received = pending.recv() => match received {
						Ok(hash) => hash,
						Err(RecvError::Lagged(skipped)) => {
							warn!(skipped, "Mempool notifications dropped");
							continue;
						}
						Err(RecvError::Closed) => {
							debug!("Pending transaction stream closed");
							return Ok(());
						}
					},
				};
				watcher.process(&hash).await?;
			}
		})
	}

	/// Looks up and persists one announced transaction.
	///
	/// # Returns
	/// * `Ok(Some(tx))` - The transaction was persisted as unconfirmed
	/// * `Ok(None)` - Nothing to persist: unknown, already mined, follower, or a transient failure
	pub async fn process(&self, hash: &str) -> Result<Option<Transaction>, SyncError> {
		let transaction = match self.reader.transaction_by_hash(hash).await {
			Ok(Some(transaction)) => transaction,
			Ok(None) => {
				debug!(tx_hash = hash, "Pending transaction vanished before lookup");
				return Ok(None);
			}
			Err(e) if e.is_fatal() => return Err(e.into()),
			Err(e) => {
				warn!(tx_hash = hash, error = %e, "Pending transaction lookup failed");
				return Ok(None);
			}
		};
		if !transaction.is_unconfirmed() {
			debug!(tx_hash = hash, "Transaction already mined");
			return Ok(None);
		}

		match self.writer.write_unconfirmed(&transaction).await {
			Ok(WriteOutcome::Persisted) => {
				metrics::record_unconfirmed_tx(&self.network);
				self.events
					.emit(ChainEvent::Transaction(Arc::new(transaction.clone())))
					.await;
				Ok(Some(transaction))
			}
			Ok(WriteOutcome::NotLeader) => Ok(None),
			Err(e) if e.is_duplicate_key() => Ok(None),
			Err(e) => Err(e.into()),
		}
	}
}
