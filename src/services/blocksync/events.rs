//! Fan-out of engine events to subscribers.
//!
//! Each subscriber owns a bounded queue. Emitting waits for room in every queue, so a slow
//! subscriber slows the engines down instead of growing memory.

use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::models::ChainEvent;

/// Bounded multi-subscriber event channel
#[derive(Debug)]
pub struct EventHub {
	subscribers: Mutex<Vec<mpsc::Sender<ChainEvent>>>,
	capacity: usize,
}

impl EventHub {
	/// Creates a hub whose subscriber queues hold `capacity` events
	pub fn new(capacity: usize) -> Self {
		Self {
			subscribers: Mutex::new(Vec::new()),
			capacity: capacity.max(1),
		}
	}

	/// Receives every event emitted from now on
	pub fn subscribe(&self) -> mpsc::Receiver<ChainEvent> {
		let (sender, receiver) = mpsc::channel(self.capacity);
		self.lock().push(sender);
		receiver
	}

	/// Delivers `event` to every live subscriber. Dropped subscribers are forgotten.
	pub async fn emit(&self, event: ChainEvent) {
		let subscribers = self.lock().clone();
		for subscriber in &subscribers {
			// A closed queue is pruned below.
			let _ = subscriber.send(event.clone()).await;
		}
		self.lock().retain(|subscriber| !subscriber.is_closed());
	}

	pub fn subscriber_count(&self) -> usize {
		self.lock().len()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<ChainEvent>>> {
		self.subscribers
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
