//! Test helper utilities for Transaction
//!
//! - `TransactionBuilder`: Builder for creating test Transaction instances

use alloy::primitives::U256;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{Log, Transaction, TRANSFER_GAS, UNCONFIRMED_BLOCK_NUMBER};

static NEXT_HASH: AtomicU64 = AtomicU64::new(1);

/// A builder for creating test transactions with default values.
///
/// Without an explicit hash every built transaction gets a unique one.
#[derive(Debug, Default)]
pub struct TransactionBuilder {
	hash: Option<String>,
	block_number: Option<i64>,
	index: Option<u64>,
	from: Option<String>,
	to: Option<Option<String>>,
	value: Option<U256>,
	gas: Option<U256>,
	gas_price: Option<U256>,
	gas_used: Option<U256>,
	nonce: Option<u64>,
	input: Option<String>,
	logs: Option<Vec<Log>>,
}

impl TransactionBuilder {
	/// Creates a new TransactionBuilder instance.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the transaction hash.
	pub fn hash(mut self, hash: &str) -> Self {
		self.hash = Some(hash.to_string());
		self
	}

	/// Sets the block number.
	pub fn block_number(mut self, block_number: i64) -> Self {
		self.block_number = Some(block_number);
		self
	}

	/// Marks the transaction as seen in the mempool only.
	pub fn unconfirmed(mut self) -> Self {
		self.block_number = Some(UNCONFIRMED_BLOCK_NUMBER);
		self
	}

	/// Sets the index in the block.
	pub fn index(mut self, index: u64) -> Self {
		self.index = Some(index);
		self
	}

	/// Sets the sender.
	pub fn from(mut self, from: &str) -> Self {
		self.from = Some(from.to_string());
		self
	}

	/// Sets the recipient.
	pub fn to(mut self, to: &str) -> Self {
		self.to = Some(Some(to.to_string()));
		self
	}

	/// Makes the transaction a contract creation.
	pub fn no_recipient(mut self) -> Self {
		self.to = Some(None);
		self
	}

	/// Sets the value.
	pub fn value(mut self, value: U256) -> Self {
		self.value = Some(value);
		self
	}

	/// Sets the gas limit.
	pub fn gas(mut self, gas: U256) -> Self {
		self.gas = Some(gas);
		self
	}

	/// Sets the gas price.
	pub fn gas_price(mut self, gas_price: U256) -> Self {
		self.gas_price = Some(gas_price);
		self
	}

	/// Sets the gas used.
	pub fn gas_used(mut self, gas_used: U256) -> Self {
		self.gas_used = Some(gas_used);
		self
	}

	/// Sets the nonce.
	pub fn nonce(mut self, nonce: u64) -> Self {
		self.nonce = Some(nonce);
		self
	}

	/// Sets the input data.
	pub fn input(mut self, input: &str) -> Self {
		self.input = Some(input.to_string());
		self
	}

	/// Sets the logs.
	pub fn logs(mut self, logs: Vec<Log>) -> Self {
		self.logs = Some(logs);
		self
	}

	/// Builds the Transaction instance.
	pub fn build(self) -> Transaction {
		let hash = self.hash.unwrap_or_else(|| {
			format!("0x{:064x}", NEXT_HASH.fetch_add(1, Ordering::Relaxed))
		});
		Transaction {
			hash,
			block_number: self.block_number.unwrap_or(1),
			index: self.index,
			from: self
				.from
				.unwrap_or_else(|| "0x0000000000000000000000000000000000000001".to_string()),
			to: self
				.to
				.unwrap_or_else(|| Some("0x0000000000000000000000000000000000000002".to_string())),
			value: self.value.unwrap_or(U256::from(1)),
			gas: self.gas.unwrap_or(U256::from(TRANSFER_GAS)),
			gas_price: self.gas_price.unwrap_or(U256::from(1_000_000_000u64)),
			gas_used: self.gas_used.unwrap_or(U256::from(TRANSFER_GAS)),
			nonce: self.nonce.unwrap_or(0),
			input: self.input.unwrap_or_else(|| "0x".to_string()),
			logs: self.logs.unwrap_or_default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_transaction() {
		let tx = TransactionBuilder::new().build();
		assert_eq!(tx.block_number, 1);
		assert_eq!(tx.gas_used, U256::from(TRANSFER_GAS));
		assert!(!tx.has_input());
	}

	#[test]
	fn test_default_hashes_are_unique() {
		let a = TransactionBuilder::new().build();
		let b = TransactionBuilder::new().build();
		assert_ne!(a.hash, b.hash);
	}

	#[test]
	fn test_unconfirmed_and_contract_creation() {
		let tx = TransactionBuilder::new()
			.unconfirmed()
			.no_recipient()
			.input("0x6080")
			.build();
		assert!(tx.is_unconfirmed());
		assert_eq!(tx.to, None);
		assert!(tx.has_input());
	}
}
