//! Bus publisher for chain events.
//!
//! Every persisted block is announced on `<service>_block`. Transactions involving a registered
//! account are published on `<service>_transaction.<address>`, once per involved address.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{Block, ChainEvent, Transaction, UNCONFIRMED_BLOCK_NUMBER},
	services::{
		bus::{BusError, EventBus},
		notification::{AccountFilter, NotificationError},
	},
};

/// Publishes engine events on the bus
pub struct TxPublisher {
	bus: Arc<dyn EventBus>,
	filter: Arc<dyn AccountFilter>,
	service_name: String,
}

impl TxPublisher {
	/// Creates a publisher
	///
	/// # Arguments
	/// * `bus` - Bus the events are published on
	/// * `filter` - Registered account lookup
	/// * `service_name` - Topic prefix
	pub fn new(
		bus: Arc<dyn EventBus>,
		filter: Arc<dyn AccountFilter>,
		service_name: impl Into<String>,
	) -> Self {
		Self {
			bus,
			filter,
			service_name: service_name.into(),
		}
	}

	pub fn block_topic(&self) -> String {
		format!("{}_block", self.service_name)
	}

	pub fn transaction_topic(&self, address: &str) -> String {
		format!("{}_transaction.{}", self.service_name, address)
	}

	/// Announces `block` and publishes its interesting transactions.
	#[instrument(skip_all, fields(block_number = block.number))]
	pub async fn publish_block(&self, block: &Block) -> Result<(), NotificationError> {
		self.bus
			.publish(&self.block_topic(), json!({ "block": block.number }))
			.await?;

		let interesting = self
			.filter
			.filter_transactions(&block.transactions, true)
			.await?;
		for tx in interesting {
			self.publish_transaction(tx, &tx.involved_addresses(true))
				.await?;
		}
		Ok(())
	}

	/// Publishes a mempool transaction if it involves a registered account.
	///
	/// Only the sender and the recipient are considered; the payload carries the unconfirmed
	/// block number and no position.
	#[instrument(skip_all, fields(tx_hash = %transaction.hash))]
	pub async fn publish_unconfirmed(
		&self,
		transaction: &Transaction,
	) -> Result<(), NotificationError> {
		let interesting = self
			.filter
			.filter_transactions(std::slice::from_ref(transaction), false)
			.await?;
		if interesting.is_empty() {
			return Ok(());
		}

		let mut payload = transaction.clone();
		payload.block_number = UNCONFIRMED_BLOCK_NUMBER;
		payload.index = None;
		self.publish_transaction(&payload, &payload.involved_addresses(false))
			.await
	}

	/// Dispatches one engine event
	pub async fn handle(&self, event: &ChainEvent) -> Result<(), NotificationError> {
		match event {
			ChainEvent::Block(block) => self.publish_block(block).await,
			ChainEvent::Transaction(tx) => self.publish_unconfirmed(tx).await,
			ChainEvent::End { height } => {
				info!(height, "History cached up to block");
				Ok(())
			}
		}
	}

	/// Publishes events until `events` closes or a fatal error occurs.
	pub async fn run(&self, mut events: mpsc::Receiver<ChainEvent>) -> Result<(), NotificationError> {
		while let Some(event) = events.recv().await {
			match self.handle(&event).await {
				Ok(()) => {}
				Err(e) if e.is_fatal() => return Err(e),
				Err(e) => warn!(error = %e, "Failed to publish event"),
			}
		}
		debug!("Event stream closed, publisher stopped");
		Ok(())
	}

	async fn publish_transaction(
		&self,
		transaction: &Transaction,
		addresses: &[String],
	) -> Result<(), NotificationError> {
		let payload = serde_json::to_value(transaction).map_err(|e| {
			BusError::serialization(
				format!("Failed to encode transaction {}", transaction.hash),
				Some(Box::new(e)),
				None,
			)
		})?;
		for address in addresses {
			self.bus
				.publish(&self.transaction_topic(address), payload.clone())
				.await?;
		}
		Ok(())
	}
}
