//! Registered account model.

use serde::{Deserialize, Serialize};

/// An account whose transactions are published on the bus.
///
/// Addresses are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAccount {
	pub address: String,
	#[serde(default = "default_active")]
	pub is_active: bool,
	/// Contracts of the ERC20 tokens the account holds
	#[serde(default)]
	pub erc20_tokens: Vec<String>,
}

fn default_active() -> bool {
	true
}

impl RegisteredAccount {
	pub fn new(address: &str) -> Self {
		Self {
			address: address.to_lowercase(),
			is_active: true,
			erc20_tokens: Vec::new(),
		}
	}

	pub fn with_token(mut self, contract: &str) -> Self {
		self.erc20_tokens.push(contract.to_lowercase());
		self
	}

	/// Whether `address` is the account itself or one of its tokens.
	pub fn matches(&self, address: &str) -> bool {
		self.address == address || self.erc20_tokens.iter().any(|token| token == address)
	}

	/// The account address followed by its token contracts
	pub fn addresses(&self) -> impl Iterator<Item = &str> {
		std::iter::once(self.address.as_str()).chain(self.erc20_tokens.iter().map(String::as_str))
	}
}
