//! Test helper utilities for Block
//!
//! - `BlockBuilder`: Builder for creating test Block instances
//! - `block_hash`: Deterministic block hash for a height and fork

use alloy::primitives::U256;

use crate::models::{derive_log_id, Block, Transaction};

/// Deterministic hash of the block at `number` on fork `fork` (0 is the canonical chain).
pub fn block_hash(number: u64, fork: u8) -> String {
	format!("0x{:02x}{:062x}", fork, number)
}

/// A builder for creating test blocks with default values.
///
/// `build` stamps the block number and position on every transaction and log, so the produced
/// block is internally consistent.
#[derive(Debug, Default)]
pub struct BlockBuilder {
	number: Option<u64>,
	hash: Option<String>,
	parent_hash: Option<String>,
	fork: u8,
	timestamp: Option<u64>,
	uncle_count: Option<u32>,
	transactions: Option<Vec<Transaction>>,
}

impl BlockBuilder {
	/// Creates a new BlockBuilder instance.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the block number.
	pub fn number(mut self, number: u64) -> Self {
		self.number = Some(number);
		self
	}

	/// Sets the block hash.
	pub fn hash(mut self, hash: &str) -> Self {
		self.hash = Some(hash.to_string());
		self
	}

	/// Sets the parent hash.
	pub fn parent_hash(mut self, parent_hash: &str) -> Self {
		self.parent_hash = Some(parent_hash.to_string());
		self
	}

	/// Derives the default hash from this fork id instead of the canonical chain.
	pub fn fork(mut self, fork: u8) -> Self {
		self.fork = fork;
		self
	}

	/// Sets the timestamp.
	pub fn timestamp(mut self, timestamp: u64) -> Self {
		self.timestamp = Some(timestamp);
		self
	}

	/// Sets the uncle count.
	pub fn uncle_count(mut self, uncle_count: u32) -> Self {
		self.uncle_count = Some(uncle_count);
		self
	}

	/// Sets the transactions.
	pub fn transactions(mut self, transactions: Vec<Transaction>) -> Self {
		self.transactions = Some(transactions);
		self
	}

	/// Adds a single transaction.
	pub fn add_transaction(mut self, transaction: Transaction) -> Self {
		let mut transactions = self.transactions.unwrap_or_default();
		transactions.push(transaction);
		self.transactions = Some(transactions);
		self
	}

	/// Builds the Block instance.
	pub fn build(self) -> Block {
		let number = self.number.unwrap_or(1);
		let mut log_index = 0u64;
		let transactions = self
			.transactions
			.unwrap_or_default()
			.into_iter()
			.enumerate()
			.map(|(tx_index, mut tx)| {
				tx.block_number = number as i64;
				tx.index = Some(tx_index as u64);
				for log in tx.logs.iter_mut() {
					log.block_number = number;
					log.tx_index = tx_index as u64;
					log.index = log_index;
					log.transaction_hash = tx.hash.clone();
					log.id = derive_log_id(number, tx_index as u64, log_index);
					log_index += 1;
				}
				tx
			})
			.collect();

		let parent_hash = self.parent_hash.unwrap_or_else(|| {
			number
				.checked_sub(1)
				.map(|parent| block_hash(parent, self.fork))
				.unwrap_or_else(|| format!("0x{:064x}", 0))
		});

		let mut block = Block {
			hash: self.hash.unwrap_or_else(|| block_hash(number, self.fork)),
			parent_hash,
			number,
			timestamp: self.timestamp.unwrap_or(1_600_000_000 + number * 15),
			uncle_count: self.uncle_count.unwrap_or(0),
			total_fee: U256::ZERO,
			transactions,
		};
		block.refresh_total_fee();
		block
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::utils::tests::builders::evm::{log::LogBuilder, transaction::TransactionBuilder};

	#[test]
	fn test_default_block() {
		let block = BlockBuilder::new().build();

		assert_eq!(block.number, 1);
		assert_eq!(block.hash, block_hash(1, 0));
		assert_eq!(block.parent_hash, block_hash(0, 0));
		assert!(block.transactions.is_empty());
	}

	#[test]
	fn test_forked_block_has_different_hash() {
		let canonical = BlockBuilder::new().number(98).build();
		let forked = BlockBuilder::new().number(98).fork(1).build();
		assert_ne!(canonical.hash, forked.hash);
	}

	#[test]
	fn test_build_stamps_transaction_positions() {
		let block = BlockBuilder::new()
			.number(10)
			.add_transaction(
				TransactionBuilder::new()
					.hash("0xa")
					.logs(vec![LogBuilder::new().build()])
					.build(),
			)
			.add_transaction(
				TransactionBuilder::new()
					.hash("0xb")
					.logs(vec![LogBuilder::new().build(), LogBuilder::new().build()])
					.build(),
			)
			.build();

		assert_eq!(block.transactions[1].block_number, 10);
		assert_eq!(block.transactions[1].index, Some(1));
		let last_log = &block.transactions[1].logs[1];
		assert_eq!(last_log.index, 2);
		assert_eq!(last_log.tx_index, 1);
		assert_eq!(last_log.transaction_hash, "0xb");
		assert_eq!(last_log.id, derive_log_id(10, 1, 2));
	}
}
