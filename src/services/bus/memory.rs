//! In-process bus.
//!
//! Messages are fanned out under a single lock, so every subscriber observes all messages in
//! the same order.

use async_trait::async_trait;
use serde_json::Value;
use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing::trace;

use crate::services::bus::{BusError, BusMessage, BusSubscription, EventBus};

#[derive(Debug, Default)]
struct BusState {
	subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>,
	published: Vec<BusMessage>,
	closed: bool,
}

/// Bus shared by every instance in the same process
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
	state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Simulates losing the broker: ends every subscription and fails later calls
	pub fn close(&self) {
		let mut state = self.lock();
		state.closed = true;
		state.subscribers.clear();
	}

	/// Every message published so far, in order
	pub fn published(&self) -> Vec<BusMessage> {
		self.lock().published.clone()
	}

	/// Messages published on `topic`, in order
	pub fn published_on(&self, topic: &str) -> Vec<Value> {
		self.lock()
			.published
			.iter()
			.filter(|message| message.topic == topic)
			.map(|message| message.payload.clone())
			.collect()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn unavailable() -> BusError {
		BusError::broker_unavailable("In-memory bus is closed", None, None)
	}
}

#[async_trait]
impl EventBus for InMemoryBus {
	async fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError> {
		let mut state = self.lock();
		if state.closed {
			return Err(Self::unavailable());
		}
		let message = BusMessage {
			topic: topic.to_string(),
			payload,
		};
		if let Some(subscribers) = state.subscribers.get_mut(topic) {
			subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
		}
		trace!(topic, "Published message");
		state.published.push(message);
		Ok(())
	}

	async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError> {
		let mut state = self.lock();
		if state.closed {
			return Err(Self::unavailable());
		}
		let (sender, receiver) = mpsc::unbounded_channel();
		state
			.subscribers
			.entry(topic.to_string())
			.or_default()
			.push(sender);
		Ok(receiver)
	}
}
