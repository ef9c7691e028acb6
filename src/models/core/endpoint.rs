//! Upstream endpoint model.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Wire transport used to talk to an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
	/// Unix domain socket (geth.ipc)
	LocalSocket,
	/// HTTP(S) JSON-RPC, poll-only
	Http,
	/// WebSocket JSON-RPC with push subscriptions
	WebSocket,
}

impl TransportKind {
	/// Chooses the transport from the URI scheme. Anything that is not http(s) or ws(s) is
	/// treated as a socket path.
	pub fn from_uri(uri: &str) -> Self {
		let lower = uri.to_ascii_lowercase();
		if lower.starts_with("http://") || lower.starts_with("https://") {
			TransportKind::Http
		} else if lower.starts_with("ws://") || lower.starts_with("wss://") {
			TransportKind::WebSocket
		} else {
			TransportKind::LocalSocket
		}
	}

	/// Whether the transport notifies the pool when the connection drops.
	pub fn has_disconnect_signal(&self) -> bool {
		!matches!(self, TransportKind::Http)
	}
}

/// A configured upstream endpoint. Endpoints are never removed; their position in the list is
/// their priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub uri: String,
	pub transport_kind: TransportKind,
	/// When the last probe or connection on this endpoint failed
	pub last_failure: Option<Instant>,
}

impl Endpoint {
	pub fn new(uri: impl Into<String>) -> Self {
		let uri = uri.into();
		Self {
			transport_kind: TransportKind::from_uri(&uri),
			uri,
			last_failure: None,
		}
	}

	pub fn mark_failed(&mut self, at: Instant) {
		self.last_failure = Some(at);
	}

	/// Whether the endpoint failed less than `cooldown` ago.
	pub fn in_cooldown(&self, now: Instant, cooldown: Duration) -> bool {
		self.last_failure
			.map(|failed_at| now.saturating_duration_since(failed_at) < cooldown)
			.unwrap_or(false)
	}
}
