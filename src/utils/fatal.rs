//! Process-wide fatal condition signal.
//!
//! Components that hit an unrecoverable condition (all upstreams gone, broker lost, store lost)
//! raise it; the bootstrap waits on it and terminates the process with a non-zero exit code.

use std::sync::Arc;
use tokio::sync::watch;

/// The first fatal condition raised in the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
	/// Component that raised the condition
	pub component: &'static str,
	/// Description including the endpoint / block / error involved
	pub message: String,
}

impl std::fmt::Display for FatalError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.component, self.message)
	}
}

/// Cloneable handle used to raise and observe the fatal condition
#[derive(Debug, Clone)]
pub struct FatalSignal {
	sender: Arc<watch::Sender<Option<FatalError>>>,
}

impl Default for FatalSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl FatalSignal {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(None);
		Self {
			sender: Arc::new(sender),
		}
	}

	/// Raises the fatal condition. Only the first call is recorded.
	pub fn raise(&self, component: &'static str, message: impl Into<String>) {
		let message = message.into();
		let recorded = self.sender.send_if_modified(|current| {
			if current.is_some() {
				return false;
			}
			*current = Some(FatalError {
				component,
				message: message.clone(),
			});
			true
		});
		if recorded {
			tracing::error!(component, "fatal condition: {}", message);
		}
	}

	pub fn is_raised(&self) -> bool {
		self.sender.borrow().is_some()
	}

	/// Returns the recorded fatal condition, if any.
	pub fn current(&self) -> Option<FatalError> {
		self.sender.borrow().clone()
	}

	/// Waits until a fatal condition is raised.
	pub async fn wait(&self) -> FatalError {
		let mut receiver = self.sender.subscribe();
		loop {
			if let Some(error) = receiver.borrow_and_update().clone() {
				return error;
			}
			if receiver.changed().await.is_err() {
				// The sender lives in `self`, so the channel cannot close while we wait.
				std::future::pending::<()>().await;
			}
		}
	}
}
