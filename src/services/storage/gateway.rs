//! Persistence gateway interface.

use async_trait::async_trait;

use crate::{
	models::{BlockRecord, Log, Transaction},
	services::storage::StoreError,
};

/// Store of blocks, transactions and logs keyed by their canonical identifiers.
///
/// Upserts are idempotent: applying the same row twice leaves the store as applying it once.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
	/// Inserts or replaces a block row
	///
	/// # Returns
	/// * `Result<(), StoreError>` - `DuplicateKey` when another hash occupies the number
	async fn upsert_block(&self, block: &BlockRecord) -> Result<(), StoreError>;

	/// Inserts or replaces a transaction row
	///
	/// A confirmed row replaces an unconfirmed one; an unconfirmed row never replaces a
	/// confirmed one.
	async fn upsert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;

	async fn upsert_log(&self, log: &Log) -> Result<(), StoreError>;

	/// Removes the block, transaction and log rows at `number`
	async fn delete_by_block_number(&self, number: u64) -> Result<(), StoreError>;

	/// Number of persisted blocks in the inclusive range
	async fn count_in_range(&self, from: u64, to: u64) -> Result<u64, StoreError>;

	/// The `limit` highest blocks, newest first
	async fn find_latest(&self, limit: usize) -> Result<Vec<BlockRecord>, StoreError>;

	async fn find_by_hash(&self, hash: &str) -> Result<Option<BlockRecord>, StoreError>;

	async fn find_by_number(&self, number: u64) -> Result<Option<BlockRecord>, StoreError>;

	async fn find_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;

	async fn logs_for_transaction(&self, hash: &str) -> Result<Vec<Log>, StoreError>;

	/// Removes unconfirmed transactions whose hash is not in `keep`
	///
	/// # Returns
	/// * `Result<u64, StoreError>` - Number of rows removed
	async fn delete_unconfirmed_except(&self, keep: &[String]) -> Result<u64, StoreError>;

	/// Removes every unconfirmed transaction
	async fn delete_all_unconfirmed(&self) -> Result<u64, StoreError>;
}
