//! Leadership-gated write path.
//!
//! Every mutation issued by the sync engines goes through a [`BlockWriter`]. It refuses to write
//! unless this instance is the leader and serializes writers through one gate, so a block is
//! never persisted interleaved with another.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::{
	models::{Block, BlockRange, BlockRecord, ElectionState, Transaction},
	services::storage::{PersistenceGateway, StoreError},
	utils::metrics,
};

/// Result of a gated write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
	Persisted,
	/// Nothing was written because this instance is not the leader
	NotLeader,
}

/// Gated writer shared by the backfill and the live tail
#[derive(Clone)]
pub struct BlockWriter {
	store: Arc<dyn PersistenceGateway>,
	gate: Arc<Semaphore>,
	leadership: watch::Receiver<ElectionState>,
}

impl BlockWriter {
	/// Creates a writer
	///
	/// # Arguments
	/// * `store` - Gateway the rows are written to
	/// * `write_concurrency` - Number of writers allowed at once
	/// * `leadership` - Election state published by the elector
	pub fn new(
		store: Arc<dyn PersistenceGateway>,
		write_concurrency: usize,
		leadership: watch::Receiver<ElectionState>,
	) -> Self {
		Self {
			store,
			gate: Arc::new(Semaphore::new(write_concurrency.max(1))),
			leadership,
		}
	}

	/// Read access to the underlying store
	pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
		&self.store
	}

	pub fn is_leader(&self) -> bool {
		self.leadership.borrow().is_leader
	}

	/// Election state the writer is gated on
	pub fn leadership(&self) -> watch::Receiver<ElectionState> {
		self.leadership.clone()
	}

	/// Persists a block: its transactions, then their logs, then the block row.
	///
	/// The block row goes last so a block only counts as present once complete. When any step
	/// fails, the rows written for that number are removed before the error is returned.
	///
	/// # Arguments
	/// * `block` - Block with transactions and logs attached
	/// * `source` - Label for the persisted block metric
	pub async fn write_block(
		&self,
		block: &Block,
		source: &'static str,
	) -> Result<WriteOutcome, StoreError> {
		let Some(_permit) = self.acquire_as_leader().await? else {
			return Ok(WriteOutcome::NotLeader);
		};

		if let Some(existing) = self.store.find_by_number(block.number).await? {
			if existing.hash != block.hash {
				return Err(StoreError::duplicate_key(
					block.number.to_string(),
					format!(
						"Block {} already stored with hash {}",
						block.number, existing.hash
					),
					None,
				));
			}
		}

		if let Err(e) = self.write_rows(block).await {
			warn!(
				block_number = block.number,
				error = %e,
				"Block write failed, removing partial rows"
			);
			if let Err(cleanup) = self.store.delete_by_block_number(block.number).await {
				warn!(
					block_number = block.number,
					error = %cleanup,
					"Failed to remove partial block rows"
				);
			}
			return Err(e);
		}

		metrics::record_block_persisted(source);
		debug!(block_number = block.number, source, "Block persisted");
		Ok(WriteOutcome::Persisted)
	}

	/// Persists a mempool transaction
	pub async fn write_unconfirmed(
		&self,
		transaction: &Transaction,
	) -> Result<WriteOutcome, StoreError> {
		let Some(_permit) = self.acquire_as_leader().await? else {
			return Ok(WriteOutcome::NotLeader);
		};
		self.store.upsert_transaction(transaction).await?;
		Ok(WriteOutcome::Persisted)
	}

	/// Deletes every row in `range`, newest first
	pub async fn rollback(&self, range: BlockRange) -> Result<WriteOutcome, StoreError> {
		let Some(_permit) = self.acquire_as_leader().await? else {
			return Ok(WriteOutcome::NotLeader);
		};
		for number in range.numbers().rev() {
			self.store.delete_by_block_number(number).await?;
		}
		Ok(WriteOutcome::Persisted)
	}

	/// Removes unconfirmed transactions that left the upstream's pending block
	pub async fn purge_unconfirmed_except(
		&self,
		keep: &[String],
	) -> Result<Option<u64>, StoreError> {
		let Some(_permit) = self.acquire_as_leader().await? else {
			return Ok(None);
		};
		self.store.delete_unconfirmed_except(keep).await.map(Some)
	}

	/// Removes every unconfirmed transaction
	pub async fn purge_all_unconfirmed(&self) -> Result<Option<u64>, StoreError> {
		let Some(_permit) = self.acquire_as_leader().await? else {
			return Ok(None);
		};
		self.store.delete_all_unconfirmed().await.map(Some)
	}

	/// The `limit` most recent persisted blocks, newest first
	pub async fn latest(&self, limit: usize) -> Result<Vec<BlockRecord>, StoreError> {
		self.store.find_latest(limit).await
	}

	async fn write_rows(&self, block: &Block) -> Result<(), StoreError> {
		for tx in &block.transactions {
			self.store.upsert_transaction(tx).await?;
		}
		for log in block.transactions.iter().flat_map(|tx| tx.logs.iter()) {
			self.store.upsert_log(log).await?;
		}
		self.store.upsert_block(&block.record()).await
	}

	/// Takes the write gate, `None` when this instance is not the leader.
	///
	/// Leadership is checked again once the gate is held, since it can be lost while queued.
	async fn acquire_as_leader(&self) -> Result<Option<SemaphorePermit<'_>>, StoreError> {
		if !self.is_leader() {
			return Ok(None);
		}
		let permit = self.gate.acquire().await.map_err(|e| {
			StoreError::store_unavailable("Write gate closed", Some(Box::new(e)), None)
		})?;
		if !self.is_leader() {
			debug!("Leadership lost while waiting for the write gate");
			return Ok(None);
		}
		Ok(Some(permit))
	}
}
