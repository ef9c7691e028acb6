//! Account filter.
//!
//! Decides which transactions concern a registered account. A transaction is interesting when
//! its recipient, its sender or one of its log emitters is a registered account address or a
//! contract of a token held by a registered account.

use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc};
use tokio::sync::RwLock;

use crate::{
	models::{RegisteredAccount, Transaction},
	services::storage::StoreError,
};

/// Lookup against the registered accounts
#[async_trait]
pub trait AccountFilter: Send + Sync {
	/// Addresses of the active accounts matching any of `candidates`, together with their token
	/// contracts
	///
	/// # Arguments
	/// * `candidates` - Lowercase addresses to look up
	async fn known_addresses(&self, candidates: &[String]) -> Result<HashSet<String>, StoreError>;

	/// The subset of `transactions` involving a registered account, in input order
	///
	/// # Arguments
	/// * `transactions` - Transactions to filter
	/// * `with_logs` - Whether log emitters count as involved addresses
	async fn filter_transactions<'a>(
		&self,
		transactions: &'a [Transaction],
		with_logs: bool,
	) -> Result<Vec<&'a Transaction>, StoreError> {
		if transactions.is_empty() {
			return Ok(Vec::new());
		}
		let mut candidates: Vec<String> = transactions
			.iter()
			.flat_map(|tx| tx.involved_addresses(with_logs))
			.collect();
		candidates.sort();
		candidates.dedup();

		let known = self.known_addresses(&candidates).await?;
		if known.is_empty() {
			return Ok(Vec::new());
		}
		Ok(transactions
			.iter()
			.filter(|tx| {
				tx.involved_addresses(with_logs)
					.iter()
					.any(|address| known.contains(address))
			})
			.collect())
	}
}

/// Account registry kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountRegistry {
	accounts: Arc<RwLock<Vec<RegisteredAccount>>>,
}

impl InMemoryAccountRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `account`, replacing any account with the same address
	pub async fn register(&self, account: RegisteredAccount) {
		let mut accounts = self.accounts.write().await;
		accounts.retain(|existing| existing.address != account.address);
		accounts.push(account);
	}

	/// Marks the account inactive; returns false when it is unknown
	pub async fn deactivate(&self, address: &str) -> bool {
		let address = address.to_lowercase();
		let mut accounts = self.accounts.write().await;
		match accounts.iter_mut().find(|account| account.address == address) {
			Some(account) => {
				account.is_active = false;
				true
			}
			None => false,
		}
	}
}

#[async_trait]
impl AccountFilter for InMemoryAccountRegistry {
	async fn known_addresses(&self, candidates: &[String]) -> Result<HashSet<String>, StoreError> {
		let accounts = self.accounts.read().await;
		Ok(accounts
			.iter()
			.filter(|account| account.is_active)
			.filter(|account| candidates.iter().any(|candidate| account.matches(candidate)))
			.flat_map(|account| account.addresses().map(String::from))
			.collect())
	}
}
