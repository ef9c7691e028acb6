//! In-memory persistence gateway.
//!
//! Enforces the same uniqueness rules as the production schema: one block row per number and per
//! hash, one transaction row per hash, one log row per id.

use async_trait::async_trait;
use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use tokio::sync::RwLock;

use crate::{
	models::{BlockRecord, Log, Transaction},
	services::storage::{PersistenceGateway, StoreError},
};

#[derive(Debug, Default)]
struct StoreState {
	blocks: BTreeMap<u64, BlockRecord>,
	block_numbers_by_hash: HashMap<String, u64>,
	transactions: HashMap<String, Transaction>,
	logs: BTreeMap<String, Log>,
}

/// Gateway keeping every row in process memory
#[derive(Debug, Clone)]
pub struct InMemoryStore {
	state: Arc<RwLock<StoreState>>,
	available: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(StoreState::default())),
			available: Arc::new(AtomicBool::new(true)),
		}
	}

	/// Makes every following operation fail with `StoreUnavailable` until re-enabled
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	/// Persisted block numbers in ascending order
	pub async fn block_numbers(&self) -> Vec<u64> {
		self.state.read().await.blocks.keys().copied().collect()
	}

	/// Every transaction row
	pub async fn transactions(&self) -> Vec<Transaction> {
		self.state
			.read()
			.await
			.transactions
			.values()
			.cloned()
			.collect()
	}

	pub async fn log_count(&self) -> usize {
		self.state.read().await.logs.len()
	}

	fn check_available(&self) -> Result<(), StoreError> {
		if self.available.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(StoreError::store_unavailable(
				"In-memory store disabled",
				None,
				None,
			))
		}
	}
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
	async fn upsert_block(&self, block: &BlockRecord) -> Result<(), StoreError> {
		self.check_available()?;
		let mut state = self.state.write().await;
		if let Some(existing) = state.blocks.get(&block.number) {
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
		if let Some(&number) = state.block_numbers_by_hash.get(&block.hash) {
			if number != block.number {
				return Err(StoreError::duplicate_key(
					block.hash.clone(),
					format!("Block hash already stored at {}", number),
					None,
				));
			}
		}
		state
			.block_numbers_by_hash
			.insert(block.hash.clone(), block.number);
		state.blocks.insert(block.number, block.clone());
		Ok(())
	}

	async fn upsert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
		self.check_available()?;
		let mut state = self.state.write().await;
		if let Some(existing) = state.transactions.get(&transaction.hash) {
			match (existing.is_unconfirmed(), transaction.is_unconfirmed()) {
				// A late mempool notification for a mined transaction.
				(false, true) => return Ok(()),
				(false, false) if existing.block_number != transaction.block_number => {
					return Err(StoreError::duplicate_key(
						transaction.hash.clone(),
						format!(
							"Transaction already confirmed in block {}",
							existing.block_number
						),
						None,
					));
				}
				_ => {}
			}
		}
		let mut row = transaction.clone();
		row.logs.clear();
		state.transactions.insert(row.hash.clone(), row);
		Ok(())
	}

	async fn upsert_log(&self, log: &Log) -> Result<(), StoreError> {
		self.check_available()?;
		self.state
			.write()
			.await
			.logs
			.insert(log.id.clone(), log.clone());
		Ok(())
	}

	async fn delete_by_block_number(&self, number: u64) -> Result<(), StoreError> {
		self.check_available()?;
		let mut state = self.state.write().await;
		if let Some(block) = state.blocks.remove(&number) {
			state.block_numbers_by_hash.remove(&block.hash);
		}
		let confirmed = number as i64;
		state
			.transactions
			.retain(|_, tx| tx.block_number != confirmed);
		state.logs.retain(|_, log| log.block_number != number);
		Ok(())
	}

	async fn count_in_range(&self, from: u64, to: u64) -> Result<u64, StoreError> {
		self.check_available()?;
		if from > to {
			return Ok(0);
		}
		Ok(self.state.read().await.blocks.range(from..=to).count() as u64)
	}

	async fn find_latest(&self, limit: usize) -> Result<Vec<BlockRecord>, StoreError> {
		self.check_available()?;
		Ok(self
			.state
			.read()
			.await
			.blocks
			.values()
			.rev()
			.take(limit)
			.cloned()
			.collect())
	}

	async fn find_by_hash(&self, hash: &str) -> Result<Option<BlockRecord>, StoreError> {
		self.check_available()?;
		let state = self.state.read().await;
		Ok(state
			.block_numbers_by_hash
			.get(hash)
			.and_then(|number| state.blocks.get(number))
			.cloned())
	}

	async fn find_by_number(&self, number: u64) -> Result<Option<BlockRecord>, StoreError> {
		self.check_available()?;
		Ok(self.state.read().await.blocks.get(&number).cloned())
	}

	async fn find_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
		self.check_available()?;
		Ok(self.state.read().await.transactions.get(hash).cloned())
	}

	async fn logs_for_transaction(&self, hash: &str) -> Result<Vec<Log>, StoreError> {
		self.check_available()?;
		let mut logs: Vec<Log> = self
			.state
			.read()
			.await
			.logs
			.values()
			.filter(|log| log.transaction_hash == hash)
			.cloned()
			.collect();
		logs.sort_by_key(|log| log.index);
		Ok(logs)
	}

	async fn delete_unconfirmed_except(&self, keep: &[String]) -> Result<u64, StoreError> {
		self.check_available()?;
		let mut state = self.state.write().await;
		let before = state.transactions.len();
		state
			.transactions
			.retain(|hash, tx| !tx.is_unconfirmed() || keep.contains(hash));
		Ok((before - state.transactions.len()) as u64)
	}

	async fn delete_all_unconfirmed(&self) -> Result<u64, StoreError> {
		self.delete_unconfirmed_except(&[]).await
	}
}
