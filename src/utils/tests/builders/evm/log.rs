//! Test helper utilities for Log
//!
//! - `LogBuilder`: Builder for creating test Log instances

use crate::models::{derive_log_id, Log};

/// A builder for creating test logs with default values.
#[derive(Debug, Default)]
pub struct LogBuilder {
	block_number: Option<u64>,
	transaction_hash: Option<String>,
	tx_index: Option<u64>,
	index: Option<u64>,
	topics: Option<Vec<String>>,
	data: Option<String>,
	address: Option<String>,
}

impl LogBuilder {
	/// Creates a new LogBuilder instance.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the block number.
	pub fn block_number(mut self, block_number: u64) -> Self {
		self.block_number = Some(block_number);
		self
	}

	/// Sets the transaction hash.
	pub fn transaction_hash(mut self, hash: &str) -> Self {
		self.transaction_hash = Some(hash.to_string());
		self
	}

	/// Sets the transaction index.
	pub fn tx_index(mut self, tx_index: u64) -> Self {
		self.tx_index = Some(tx_index);
		self
	}

	/// Sets the log index.
	pub fn index(mut self, index: u64) -> Self {
		self.index = Some(index);
		self
	}

	/// Sets the topics.
	pub fn topics(mut self, topics: Vec<&str>) -> Self {
		self.topics = Some(topics.into_iter().map(String::from).collect());
		self
	}

	/// Sets the data.
	pub fn data(mut self, data: &str) -> Self {
		self.data = Some(data.to_string());
		self
	}

	/// Sets the emitting address.
	pub fn address(mut self, address: &str) -> Self {
		self.address = Some(address.to_string());
		self
	}

	/// Builds the Log instance.
	pub fn build(self) -> Log {
		let block_number = self.block_number.unwrap_or(1);
		let tx_index = self.tx_index.unwrap_or(0);
		let index = self.index.unwrap_or(0);
		let topics = self.topics.unwrap_or_else(|| {
			vec!["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string()]
		});
		Log {
			id: derive_log_id(block_number, tx_index, index),
			block_number,
			transaction_hash: self
				.transaction_hash
				.unwrap_or_else(|| format!("0x{:064x}", 0)),
			tx_index,
			index,
			removed: false,
			signature: topics.first().cloned(),
			topics,
			data: self.data.unwrap_or_else(|| "0x".to_string()),
			address: self
				.address
				.unwrap_or_else(|| "0x0000000000000000000000000000000000000003".to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_log_signature_is_first_topic() {
		let log = LogBuilder::new().build();
		assert_eq!(log.signature.as_deref(), Some(log.topics[0].as_str()));
	}

	#[test]
	fn test_custom_position_changes_id() {
		let a = LogBuilder::new().block_number(5).index(1).build();
		let b = LogBuilder::new().block_number(5).index(2).build();
		assert_ne!(a.id, b.id);
	}
}
