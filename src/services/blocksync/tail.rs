//! Live tail.
//!
//! Follows the upstream head one block at a time, in ascending order. Before every block the
//! tail checks that the last persisted block is still canonical; when it is not, the
//! consensus-depth window is rolled back and the tail resumes from the rebuilt cursor.

use std::{sync::Arc, time::Duration};
use tokio::{
	sync::{watch, Mutex},
	task::JoinHandle,
	time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{BlockRange, ChainEvent, SyncCursor, TailConfig},
	services::{
		blockchain::ChainReader,
		blocksync::{EventHub, MempoolWatcher, SyncError, SyncInterrupt},
		storage::{BlockWriter, WriteOutcome},
	},
	utils::metrics,
};

/// Observable state of the tail loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
	CatchingUp,
	WaitingForNextBlock,
	ReorgDetected,
	Stopped,
}

/// Result of one tail iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
	/// Block `n` was processed and the cursor moved past it
	Advanced(u64),
	Interrupted(SyncInterrupt),
}

/// Follows the chain head
pub struct LiveTailEngine {
	reader: Arc<dyn ChainReader>,
	writer: BlockWriter,
	events: Arc<EventHub>,
	config: TailConfig,
	depth: usize,
	network: String,
	cursor: Mutex<SyncCursor>,
	state: watch::Sender<TailState>,
	mempool: MempoolWatcher,
	mempool_task: Mutex<Option<JoinHandle<Result<(), SyncError>>>>,
	cancel: CancellationToken,
}

impl LiveTailEngine {
	/// Creates the engine
	///
	/// # Arguments
	/// * `reader` - Upstream chain access
	/// * `writer` - Gated write path, shared with the backfill
	/// * `events` - Receives block and transaction events
	/// * `config` - Poll and retry delays
	/// * `consensus_depth` - Size of the reorg detection window
	/// * `network` - Metric label
	pub fn new(
		reader: Arc<dyn ChainReader>,
		writer: BlockWriter,
		events: Arc<EventHub>,
		config: TailConfig,
		consensus_depth: usize,
		network: impl Into<String>,
	) -> Self {
		let network = network.into();
		let cancel = CancellationToken::new();
		let mempool = MempoolWatcher::new(
			reader.clone(),
			writer.clone(),
			events.clone(),
			network.clone(),
			cancel.child_token(),
		);
		let (state, _) = watch::channel(TailState::CatchingUp);
		Self {
			reader,
			writer,
			events,
			config,
			depth: consensus_depth,
			network,
			cursor: Mutex::new(SyncCursor::new(consensus_depth)),
			state,
			mempool,
			mempool_task: Mutex::new(None),
			cancel,
		}
	}

	pub fn state(&self) -> TailState {
		*self.state.borrow()
	}

	/// Watches state transitions
	pub fn subscribe_state(&self) -> watch::Receiver<TailState> {
		self.state.subscribe()
	}

	/// Snapshot of the cursor
	pub async fn cursor(&self) -> SyncCursor {
		self.cursor.lock().await.clone()
	}

	/// Builds the cursor from the persisted history and purges stale unconfirmed rows.
	///
	/// With nothing persisted the tail starts `consensus_depth` blocks below the head.
	#[instrument(skip_all, fields(network = %self.network))]
	pub async fn init(&self) -> Result<(), SyncError> {
		let records = self.writer.latest(self.depth).await?;
		let cursor = if records.is_empty() {
			let head = self.reader.height().await?;
			SyncCursor::starting_at(head.saturating_sub(self.depth as u64), self.depth)
		} else {
			SyncCursor::from_records(&records, self.depth)
		};
		info!(height = cursor.height(), "Live tail cursor initialized");
		metrics::set_cursor_height(&self.network, cursor.height());
		*self.cursor.lock().await = cursor;

		if self.writer.is_leader() && self.reader.pending_block().await?.is_none() {
			if let Some(purged) = self.writer.purge_all_unconfirmed().await? {
				info!(purged, "Purged unconfirmed transactions");
			}
		}
		Ok(())
	}

	/// Processes the block at the cursor, if the upstream has it.
	#[instrument(skip_all)]
	pub async fn step(&self) -> Result<Step, SyncError> {
		let mut cursor = self.cursor.lock().await;
		let head = self.reader.height().await?;

		if head == 0 {
			if let Some(status) = self.reader.sync_status().await? {
				if status.not_started() {
					return Ok(Step::Interrupted(SyncInterrupt::NotYetSynced));
				}
			}
		}
		if head < cursor.height() {
			return Ok(Step::Interrupted(SyncInterrupt::WaitForNextBlock));
		}

		if let Some((tip_number, tip_hash)) = cursor.tip() {
			let canonical = self.reader.block_by_number(tip_number, false).await?;
			if canonical.as_ref().map(|block| block.hash.as_str()) != Some(tip_hash) {
				warn!(
					block_number = tip_number,
					persisted = tip_hash,
					"Persisted tip is no longer canonical"
				);
				return Ok(Step::Interrupted(SyncInterrupt::ReorgDetected {
					height: tip_number,
				}));
			}
		}

		let number = cursor.height();
		let Some(block) = self.reader.fetch_block(number).await? else {
			return Ok(Step::Interrupted(SyncInterrupt::WaitForNextBlock));
		};
		if let Some((tip_number, tip_hash)) = cursor.tip() {
			if block.parent_hash != tip_hash {
				warn!(
					block_number = number,
					parent_hash = %block.parent_hash,
					"Block does not extend the persisted tip"
				);
				return Ok(Step::Interrupted(SyncInterrupt::ReorgDetected {
					height: tip_number,
				}));
			}
		}

		match self.writer.write_block(&block, "tail").await {
			Ok(WriteOutcome::Persisted) => {
				cursor.advance(number, block.hash.clone());
				self.events.emit(ChainEvent::Block(Arc::new(block))).await;
				self.purge_dropped_transactions().await?;
			}
			Ok(WriteOutcome::NotLeader) => cursor.advance(number, block.hash.clone()),
			Err(e) if e.is_duplicate_key() => {
				warn!(block_number = number, "A different block is stored at the cursor");
				return Ok(Step::Interrupted(SyncInterrupt::ReorgDetected {
					height: number,
				}));
			}
			Err(e) => return Err(e.into()),
		}
		metrics::set_cursor_height(&self.network, cursor.height());
		debug!(block_number = number, "Live tail advanced");
		Ok(Step::Advanced(number))
	}

	/// Removes the consensus-depth window at the cursor, widened to include `suspect`.
	///
	/// The leader deletes the rows and rebuilds the cursor from what is left in the store; a
	/// follower only moves its own cursor back.
	#[instrument(skip_all, fields(network = %self.network, suspect = suspect))]
	pub async fn rollback(&self, suspect: u64) -> Result<BlockRange, SyncError> {
		let mut cursor = self.cursor.lock().await;
		let range = cursor.rollback_range(suspect);

		match self.writer.rollback(range).await? {
			WriteOutcome::Persisted => {
				let records = self.writer.latest(self.depth).await?;
				let rebuilt = SyncCursor::from_records(&records, self.depth);
				*cursor = if rebuilt.height() == range.from {
					rebuilt
				} else {
					SyncCursor::starting_at(range.from, self.depth)
				};
			}
			WriteOutcome::NotLeader => cursor.rewind_to(range.from),
		}

		metrics::record_reorg(&self.network, range.len());
		metrics::set_cursor_height(&self.network, cursor.height());
		info!(
			rolled_back = %range,
			height = cursor.height(),
			"Rolled back after reorg"
		);
		Ok(range)
	}

	/// Runs the tail until [`stop_sync`](Self::stop_sync) or a fatal error.
	#[instrument(skip_all, fields(network = %self.network))]
	pub async fn run(&self) -> Result<(), SyncError> {
		let result = self.run_loop().await;
		if let Some(task) = self.mempool_task.lock().await.take() {
			task.abort();
		}
		self.state.send_replace(TailState::Stopped);
		info!("Live tail stopped");
		result
	}

	/// Stops at the top of the next iteration; the mempool subscription ends right away.
	pub fn stop_sync(&self) {
		self.cancel.cancel();
	}

	async fn run_loop(&self) -> Result<(), SyncError> {
		while let Err(e) = self.init().await {
			if e.is_fatal() {
				return Err(e);
			}
			warn!(error = %e, "Live tail initialization failed, retrying");
			if self.pause(self.config.retry_delay()).await {
				return Ok(());
			}
		}

		while !self.cancel.is_cancelled() {
			self.ensure_mempool_watcher().await?;

			let delay = match self.step().await {
				Ok(Step::Advanced(_)) => {
					self.state.send_replace(TailState::CatchingUp);
					None
				}
				Ok(Step::Interrupted(
					SyncInterrupt::WaitForNextBlock | SyncInterrupt::NotYetSynced,
				)) => {
					self.state.send_replace(TailState::WaitingForNextBlock);
					Some(self.config.poll_interval())
				}
				Ok(Step::Interrupted(SyncInterrupt::ReorgDetected { height })) => {
					self.state.send_replace(TailState::ReorgDetected);
					self.rollback(height).await?;
					self.state.send_replace(TailState::CatchingUp);
					None
				}
				Err(e) if e.is_fatal() => return Err(e),
				Err(e) => {
					warn!(error = %e, "Live tail step failed, retrying");
					Some(self.config.retry_delay())
				}
			};

			if let Some(delay) = delay {
				if self.pause(delay).await {
					break;
				}
			}
		}
		Ok(())
	}

	/// Sleeps for `duration`; true when stopped meanwhile.
	async fn pause(&self, duration: Duration) -> bool {
		tokio::select! {
			_ = self.cancel.cancelled() => true,
			_ = sleep(duration) => false,
		}
	}

	/// Restarts the mempool watcher when its task ended; a fatal error it ended with is returned.
	async fn ensure_mempool_watcher(&self) -> Result<(), SyncError> {
		let mut slot = self.mempool_task.lock().await;
		if let Some(task) = slot.as_ref() {
			if !task.is_finished() {
				return Ok(());
			}
		}
		if let Some(task) = slot.take() {
			match task.await {
				Ok(Err(e)) if e.is_fatal() => return Err(e),
				Ok(Err(e)) => warn!(error = %e, "Mempool watcher failed"),
				Ok(Ok(())) => {}
				Err(e) => warn!(error = %e, "Mempool watcher task aborted"),
			}
		}
		if !self.cancel.is_cancelled() {
			*slot = Some(self.mempool.spawn());
		}
		Ok(())
	}

	async fn purge_dropped_transactions(&self) -> Result<(), SyncError> {
		let pending = match self.reader.pending_block().await {
			Ok(pending) => pending,
			Err(e) if e.is_fatal() => return Err(e.into()),
			Err(e) => {
				warn!(error = %e, "Pending block lookup failed, skipping purge");
				return Ok(());
			}
		};
		let Some(pending) = pending.filter(|pending| !pending.transactions.is_empty()) else {
			return Ok(());
		};
		if let Some(purged) = self
			.writer
			.purge_unconfirmed_except(&pending.transactions)
			.await?
		{
			if purged > 0 {
				debug!(purged, "Purged dropped unconfirmed transactions");
			}
		}
		Ok(())
	}
}
