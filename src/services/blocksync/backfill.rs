//! Historical backfill.
//!
//! Reconciles the persisted history with the chain once at startup: finds the missing ranges
//! below the safe height and fetches them, one task per upstream endpoint.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{BackfillConfig, BlockRange, ChainEvent, ElectionState},
	services::{
		blockchain::ChainReader,
		blocksync::{discover_gaps, EventHub, SyncError},
		bus::BusError,
		storage::{BlockWriter, WriteOutcome},
	},
	utils::metrics,
};

/// Missing ranges and the height they were computed against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillPlan {
	/// Newest first
	pub gaps: Vec<BlockRange>,
	/// Safe height the history is reconciled up to
	pub target_height: u64,
}

/// Fetches the persisted history's missing blocks
pub struct HistoricalBackfillEngine {
	reader: Arc<dyn ChainReader>,
	writer: BlockWriter,
	events: Arc<EventHub>,
	config: BackfillConfig,
	consensus_depth: u64,
	parallelism: usize,
	network: String,
	cancel: CancellationToken,
}

impl HistoricalBackfillEngine {
	/// Creates the engine
	///
	/// # Arguments
	/// * `reader` - Upstream chain access
	/// * `writer` - Gated write path
	/// * `events` - Receives a block event per filled block and the final end event
	/// * `config` - Chunk size and retry policy
	/// * `consensus_depth` - Blocks below the head treated as not yet final
	/// * `parallelism` - Gaps fetched at once, usually the endpoint count
	/// * `network` - Metric label
	pub fn new(
		reader: Arc<dyn ChainReader>,
		writer: BlockWriter,
		events: Arc<EventHub>,
		config: BackfillConfig,
		consensus_depth: u64,
		parallelism: usize,
		network: impl Into<String>,
	) -> Self {
		Self {
			reader,
			writer,
			events,
			config,
			consensus_depth,
			parallelism: parallelism.max(1),
			network: network.into(),
			cancel: CancellationToken::new(),
		}
	}

	/// Stops after the blocks in flight
	pub fn stop_sync(&self) {
		self.cancel.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Waits for the election to settle, then reconciles and fills the history as leader.
	///
	/// A follower persists nothing and reports the end right away.
	#[instrument(skip_all, fields(network = %self.network))]
	pub async fn sync(&self) -> Result<BackfillPlan, SyncError> {
		let mut leadership = self.writer.leadership();
		if leadership
			.wait_for(ElectionState::leader_or_synced)
			.await
			.is_err()
		{
			return Err(BusError::broker_unavailable(
				"Leader election ended before it settled",
				None,
				None,
			)
			.into());
		}

		if !self.writer.is_leader() {
			let target_height = self.safe_height().await?.unwrap_or_default();
			info!(target_height, "Not the leader, skipping backfill");
			self.events
				.emit(ChainEvent::End {
					height: target_height,
				})
				.await;
			return Ok(BackfillPlan {
				gaps: Vec::new(),
				target_height,
			});
		}

		let plan = self.reconcile().await?;
		self.run(&plan).await?;
		Ok(plan)
	}

	/// Finds the missing ranges in `[0, head - consensus_depth]`.
	#[instrument(skip_all, fields(network = %self.network))]
	pub async fn reconcile(&self) -> Result<BackfillPlan, SyncError> {
		let Some(target_height) = self.safe_height().await? else {
			info!("Chain is shallower than the consensus depth, nothing to backfill");
			return Ok(BackfillPlan {
				gaps: Vec::new(),
				target_height: 0,
			});
		};

		let gaps = discover_gaps(
			self.writer.store().as_ref(),
			target_height,
			self.config.chunk_size,
		)
		.await?;
		metrics::record_gaps(&self.network, gaps.len());
		let missing: u64 = gaps.iter().map(BlockRange::len).sum();
		info!(
			target_height,
			gaps = gaps.len(),
			missing,
			"History reconciled"
		);
		Ok(BackfillPlan {
			gaps,
			target_height,
		})
	}

	/// Fills every gap of `plan`, then emits the end event.
	///
	/// Gaps run concurrently; blocks within a gap run in ascending order.
	#[instrument(skip_all, fields(network = %self.network, gaps = plan.gaps.len()))]
	pub async fn run(&self, plan: &BackfillPlan) -> Result<(), SyncError> {
		let mut results = stream::iter(plan.gaps.iter().copied())
			.map(|gap| self.fill_gap(gap))
			.buffer_unordered(self.parallelism);

		while let Some(result) = results.next().await {
			result?;
		}
		drop(results);

		if self.cancel.is_cancelled() {
			info!("Backfill stopped before completion");
			return Ok(());
		}
		info!(target_height = plan.target_height, "Backfill complete");
		self.events
			.emit(ChainEvent::End {
				height: plan.target_height,
			})
			.await;
		Ok(())
	}

	async fn safe_height(&self) -> Result<Option<u64>, SyncError> {
		let head = self.reader.height().await?;
		Ok(head.checked_sub(self.consensus_depth))
	}

	#[instrument(skip_all, fields(gap_from = gap.from, gap_to = gap.to))]
	async fn fill_gap(&self, gap: BlockRange) -> Result<(), SyncError> {
		debug!("Filling gap");
		for number in gap.numbers() {
			if self.cancel.is_cancelled() {
				break;
			}
			self.fill_block(number).await?;
		}
		Ok(())
	}

	/// Fetches and persists one block, retrying with a fixed delay until it lands or the engine
	/// stops. Only fatal upstream or store errors end the attempt.
	async fn fill_block(&self, number: u64) -> Result<(), SyncError> {
		let mut attempt = 0u64;
		loop {
			let failure = match self.reader.fetch_block(number).await {
				Ok(Some(block)) => {
					return match self.writer.write_block(&block, "backfill").await {
						Ok(WriteOutcome::Persisted) => {
							self.events.emit(ChainEvent::Block(Arc::new(block))).await;
							Ok(())
						}
						Ok(WriteOutcome::NotLeader) => Ok(()),
						Err(e) if e.is_duplicate_key() => {
							debug!(block_number = number, "Block already inserted concurrently");
							Ok(())
						}
						Err(e) => Err(e.into()),
					};
				}
				Ok(None) => format!("block {} not available upstream", number),
				Err(e) if e.is_fatal() => return Err(e.into()),
				Err(e) => e.to_string(),
			};

			attempt += 1;
			warn!(
				block_number = number,
				attempt,
				error = %failure,
				"Block fetch failed, retrying"
			);
			tokio::select! {
				_ = self.cancel.cancelled() => return Ok(()),
				_ = sleep(self.config.retry_delay()) => {}
			}
		}
	}
}
