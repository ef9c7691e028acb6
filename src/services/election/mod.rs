//! Leader election over the message bus.
//!
//! Best-effort mutual exclusion between redundant instances. Each round an instance broadcasts
//! `findMaster`; whoever believes itself leader answers with `setMaster(id)`. If nobody answers
//! within the find window, the instance promotes itself. Every instance takes the sender of the
//! most recent `setMaster` as the leader.
//!
//! Two instances that both find no leader in the same window both promote themselves; the
//! leader is then whichever `setMaster` the bus delivers last.

use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
	models::{ElectionConfig, ElectionState},
	services::bus::{BusError, BusSubscription, EventBus},
	utils::{fatal::FatalSignal, metrics},
};

/// Participant in the leader election
pub struct LeaderElector {
	self_id: String,
	bus: Arc<dyn EventBus>,
	config: ElectionConfig,
	find_topic: String,
	set_topic: String,
	state: watch::Sender<ElectionState>,
	fatal: FatalSignal,
	cancel: CancellationToken,
	tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl LeaderElector {
	/// Creates an elector with a fresh random id
	///
	/// # Arguments
	/// * `service_name` - Deployment scope of the election topics
	/// * `bus` - Bus carrying the election messages
	/// * `config` - Election windows and round intervals
	/// * `fatal` - Raised when the broker is lost
	pub fn new(
		service_name: &str,
		bus: Arc<dyn EventBus>,
		config: ElectionConfig,
		fatal: FatalSignal,
	) -> Arc<Self> {
		let self_id = Uuid::new_v4().to_string();
		let (state, _) = watch::channel(ElectionState::new(self_id.clone()));
		Arc::new(Self {
			self_id,
			bus,
			config,
			find_topic: format!("{}_findMaster", service_name),
			set_topic: format!("{}_setMaster", service_name),
			state,
			fatal,
			cancel: CancellationToken::new(),
			tasks: tokio::sync::Mutex::new(Vec::new()),
		})
	}

	pub fn self_id(&self) -> &str {
		&self.self_id
	}

	/// Subscribes to the election topics and starts the round loop.
	#[instrument(skip_all, fields(self_id = %self.self_id))]
	pub async fn start(self: &Arc<Self>) -> Result<(), BusError> {
		let find = self.bus.subscribe(&self.find_topic).await?;
		let set = self.bus.subscribe(&self.set_topic).await?;

		let mut tasks = self.tasks.lock().await;
		tasks.push(tokio::spawn(self.clone().listen(find, set)));
		tasks.push(tokio::spawn(self.clone().run_rounds()));
		info!("Leader election started");
		Ok(())
	}

	/// Whether this instance currently holds leadership
	pub fn is_leader(&self) -> bool {
		self.state.borrow().is_leader
	}

	/// Read-only view of the election state
	pub fn state(&self) -> watch::Receiver<ElectionState> {
		self.state.subscribe()
	}

	/// Waits until this instance is leader or a finished round confirmed another leader.
	pub async fn wait_until_leader_or_synced(&self) {
		let mut state = self.state.subscribe();
		// The sender lives in `self`, so the channel stays open while we wait.
		let _ = state.wait_for(ElectionState::leader_or_synced).await;
	}

	/// Stops participating. In-flight publishes complete; subscriptions are dropped.
	pub async fn stop(&self) {
		self.cancel.cancel();
		for task in self.tasks.lock().await.drain(..) {
			let _ = task.await;
		}
		info!(self_id = %self.self_id, "Leader election stopped");
	}

	async fn listen(self: Arc<Self>, mut find: BusSubscription, mut set: BusSubscription) {
		loop {
			tokio::select! {
				_ = self.cancel.cancelled() => break,
				message = find.recv() => match message {
					Some(_) => {
						if self.is_leader() {
							if let Err(e) = self.announce().await {
								self.broker_lost(e);
								break;
							}
						}
					}
					None => {
						self.broker_lost(BusError::broker_unavailable(
							"findMaster subscription ended",
							None,
							None,
						));
						break;
					}
				},
				message = set.recv() => match message {
					Some(message) => match message.payload.get("id").and_then(Value::as_str) {
						Some(leader_id) => self.observe(leader_id),
						None => warn!(payload = %message.payload, "Ignoring malformed setMaster"),
					},
					None => {
						self.broker_lost(BusError::broker_unavailable(
							"setMaster subscription ended",
							None,
							None,
						));
						break;
					}
				},
			}
		}
	}

	async fn run_rounds(self: Arc<Self>) {
		loop {
			self.state.send_modify(ElectionState::begin_round);
			if let Err(e) = self
				.bus
				.publish(&self.find_topic, json!({ "id": self.self_id }))
				.await
			{
				self.broker_lost(e);
				return;
			}
			if self.pause(self.config.find_window()).await {
				return;
			}

			if self.state.borrow().current_leader.is_none() {
				info!(self_id = %self.self_id, "No leader answered, promoting self");
				if let Err(e) = self.announce().await {
					self.broker_lost(e);
					return;
				}
			}
			if self.pause(self.config.sync_window()).await {
				return;
			}
			self.state.send_modify(|state| state.synced = true);

			let delay = if self.state.borrow().current_leader.is_some() {
				self.config.round_interval()
			} else {
				self.config.retry_interval()
			};
			if self.pause(delay).await {
				return;
			}
		}
	}

	async fn announce(&self) -> Result<(), BusError> {
		self.bus
			.publish(&self.set_topic, json!({ "id": self.self_id }))
			.await
	}

	fn observe(&self, leader_id: &str) {
		let was_leader = self.is_leader();
		self.state
			.send_modify(|state| state.observe_leader(leader_id));
		let is_leader = self.is_leader();
		if is_leader != was_leader {
			if is_leader {
				info!(self_id = %self.self_id, "Became leader");
			} else {
				info!(self_id = %self.self_id, leader = leader_id, "Lost leadership");
			}
		}
		metrics::set_leader(is_leader);
	}

	fn broker_lost(&self, error: BusError) {
		self.fatal
			.raise("leader_elector", format!("Broker lost: {}", error));
		self.cancel.cancel();
	}

	/// Sleeps for `duration`; true when stopped meanwhile.
	async fn pause(&self, duration: Duration) -> bool {
		tokio::select! {
			_ = self.cancel.cancelled() => true,
			_ = sleep(duration) => false,
		}
	}
}
