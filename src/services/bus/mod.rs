//! Topic based message bus.
//!
//! The bus carries both the election protocol and the published chain events. Delivery is
//! at-least-once; consumers must be idempotent.

mod error;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use error::BusError;
pub use memory::InMemoryBus;

/// A message on a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
	pub topic: String,
	pub payload: Value,
}

/// Stream of messages for one subscription. Ends when the broker connection is lost.
pub type BusSubscription = mpsc::UnboundedReceiver<BusMessage>;

/// Publish/subscribe transport
#[async_trait]
pub trait EventBus: Send + Sync {
	/// Publishes `payload` on `topic`
	///
	/// # Returns
	/// * `Result<(), BusError>` - `BrokerUnavailable` when the broker is gone
	async fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError>;

	/// Subscribes to every message published on `topic` from now on
	async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError>;
}
