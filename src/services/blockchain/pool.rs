//! Upstream connection pool.
//!
//! Keeps exactly one active connection to the highest-priority endpoint that answers, fails over
//! when that connection dies and periodically re-probes higher-priority endpoints so the pool can
//! return to them.

use futures::{future::BoxFuture, stream::FuturesUnordered, StreamExt};
use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Weak,
	},
};
use tokio::{
	sync::{broadcast, Mutex, RwLock},
	task::JoinHandle,
	time::{sleep, timeout, Instant},
};
use tracing::{debug, info, instrument, warn};

use crate::{
	models::{Endpoint, PoolConfig},
	services::blockchain::{
		transports::{BlockchainTransport, TransportError, TransportFactory, PROBE_METHOD},
		BlockChainError,
	},
	utils::{fatal::FatalSignal, metrics},
};

/// Capacity of the pending transaction broadcast shared by all subscribers
const PENDING_BROADCAST_CAPACITY: usize = 4096;

/// Handle to the connection currently in use.
///
/// `generation` identifies this particular connection; failure reports carrying an older
/// generation are ignored.
#[derive(Clone)]
pub struct ActiveConnection {
	pub endpoint_index: usize,
	pub uri: String,
	pub transport: Arc<dyn BlockchainTransport>,
	pub generation: u64,
}

impl std::fmt::Debug for ActiveConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ActiveConnection")
			.field("endpoint_index", &self.endpoint_index)
			.field("uri", &self.uri)
			.field("generation", &self.generation)
			.finish()
	}
}

/// Active connection plus the background tasks watching it
struct ActiveSlot {
	connection: ActiveConnection,
	watchers: Vec<JoinHandle<()>>,
}

impl ActiveSlot {
	async fn shutdown(self) {
		for watcher in &self.watchers {
			watcher.abort();
		}
		self.connection.transport.close().await;
	}
}

/// Pool of upstream endpoints with a single active connection.
///
/// Switching is serialized by `switch_lock`; the active slot is only replaced while it is held,
/// or taken out by a failure report for the current generation.
pub struct ConnectionPool {
	self_ref: Weak<ConnectionPool>,
	endpoints: RwLock<Vec<Endpoint>>,
	active: RwLock<Option<ActiveSlot>>,
	switch_lock: Mutex<()>,
	next_generation: AtomicU64,
	stopped: AtomicBool,
	factory: Arc<dyn TransportFactory>,
	config: PoolConfig,
	pending_tx: broadcast::Sender<String>,
	fatal: FatalSignal,
}

impl ConnectionPool {
	/// Creates a pool. No connection is opened until the first [`ConnectionPool::get_active`].
	///
	/// # Arguments
	/// * `endpoints` - Endpoints in priority order, highest first
	/// * `factory` - Opens transports for endpoints
	/// * `config` - Probe, cooldown and retry settings
	/// * `fatal` - Raised when every endpoint stays unreachable
	pub fn new(
		endpoints: Vec<Endpoint>,
		factory: Arc<dyn TransportFactory>,
		config: PoolConfig,
		fatal: FatalSignal,
	) -> Arc<Self> {
		let (pending_tx, _) = broadcast::channel(PENDING_BROADCAST_CAPACITY);
		Arc::new_cyclic(|self_ref| Self {
			self_ref: self_ref.clone(),
			endpoints: RwLock::new(endpoints),
			active: RwLock::new(None),
			switch_lock: Mutex::new(()),
			next_generation: AtomicU64::new(1),
			stopped: AtomicBool::new(false),
			factory,
			config,
			pending_tx,
			fatal,
		})
	}

	/// Snapshot of the configured endpoints and their failure stamps
	pub async fn endpoints(&self) -> Vec<Endpoint> {
		self.endpoints.read().await.clone()
	}

	pub async fn endpoint_count(&self) -> usize {
		self.endpoints.read().await.len()
	}

	/// Receiver of pending transaction hashes from whichever connection is active
	pub fn subscribe_pending(&self) -> broadcast::Receiver<String> {
		self.pending_tx.subscribe()
	}

	/// Returns the active connection, selecting one if there is none.
	///
	/// # Returns
	/// * `Result<ActiveConnection, BlockChainError>` - `UpstreamUnavailable` once every probe
	///   round failed
	pub async fn get_active(&self) -> Result<ActiveConnection, BlockChainError> {
		if let Some(connection) = self.current().await {
			return Ok(connection);
		}
		if self.stopped.load(Ordering::SeqCst) {
			return Err(BlockChainError::connection_lost(
				"",
				"Connection pool is stopped",
				None,
				None,
			));
		}

		let _guard = self.switch_lock.lock().await;
		// Another caller may have switched while we waited for the lock.
		if let Some(connection) = self.current().await {
			return Ok(connection);
		}
		if self.fatal.is_raised() {
			return Err(BlockChainError::upstream_unavailable(
				"All upstream endpoints are unreachable",
				None,
				None,
			));
		}
		self.switch().await
	}

	/// Marks the endpoint behind `generation` as failed and starts a failover.
	///
	/// Reports for a connection that was already replaced are ignored. The future is boxed
	/// because the watchers spawned by a failover report failures themselves.
	pub fn report_failure(&self, generation: u64) -> BoxFuture<'_, ()> {
		Box::pin(async move {
			let slot = {
				let mut active = self.active.write().await;
				match active.as_ref() {
					Some(slot) if slot.connection.generation == generation => active.take(),
					_ => None,
				}
			};
			let Some(slot) = slot else {
				debug!(generation, "Ignoring failure report for a replaced connection");
				return;
			};

			warn!(
				endpoint = %slot.connection.uri,
				generation,
				"Upstream connection failed, switching provider"
			);
			if let Some(endpoint) = self
				.endpoints
				.write()
				.await
				.get_mut(slot.connection.endpoint_index)
			{
				endpoint.mark_failed(Instant::now());
			}

			let pool = self.self_ref.upgrade();
			tokio::spawn(async move {
				slot.shutdown().await;
				if let Some(pool) = pool {
					if !pool.stopped.load(Ordering::SeqCst) {
						// Failures are surfaced through the fatal signal.
						let _ = pool.get_active().await;
					}
				}
			});
		})
	}

	/// Probes the endpoints ranked above the active one and switches to the best that answers.
	#[instrument(skip_all)]
	pub async fn reprobe(&self) {
		if self.stopped.load(Ordering::SeqCst) {
			return;
		}
		let _guard = self.switch_lock.lock().await;
		let current = match self.active.read().await.as_ref() {
			Some(slot) => slot.connection.endpoint_index,
			None => return,
		};
		if current == 0 {
			return;
		}

		if let Some((index, transport)) = self.probe_round(current).await {
			info!(
				endpoint = %transport.endpoint_uri(),
				"Returning to higher priority provider"
			);
			self.install(index, transport).await;
		}
	}

	/// Closes the active connection and stops reconnecting.
	pub async fn stop(&self) {
		self.stopped.store(true, Ordering::SeqCst);
		let slot = self.active.write().await.take();
		if let Some(slot) = slot {
			slot.shutdown().await;
		}
	}

	async fn current(&self) -> Option<ActiveConnection> {
		self.active
			.read()
			.await
			.as_ref()
			.map(|slot| slot.connection.clone())
	}

	/// Runs probe rounds until one succeeds. Caller holds `switch_lock`.
	async fn switch(&self) -> Result<ActiveConnection, BlockChainError> {
		let limit = self.endpoint_count().await;
		let attempts = self.config.max_switch_attempts.max(1);
		for attempt in 1..=attempts {
			if let Some((index, transport)) = self.probe_round(limit).await {
				return Ok(self.install(index, transport).await);
			}
			warn!(attempt, attempts, "No upstream endpoint answered");
			if attempt < attempts {
				sleep(self.config.retry_delay()).await;
			}
		}

		let error = BlockChainError::upstream_unavailable(
			format!(
				"No upstream endpoint answered after {} probe rounds",
				attempts
			),
			None,
			None,
		);
		self.fatal.raise("connection_pool", error.to_string());
		Err(error)
	}

	/// Probes the first `limit` endpoints concurrently, skipping those in cooldown.
	///
	/// The winner is the highest-priority endpoint that answered, settled as soon as every
	/// endpoint ranked above it has failed. Losing transports are closed.
	async fn probe_round(&self, limit: usize) -> Option<(usize, Arc<dyn BlockchainTransport>)> {
		let now = Instant::now();
		let cooldown = self.config.failure_cooldown();
		let candidates: Vec<(usize, Endpoint)> = self
			.endpoints
			.read()
			.await
			.iter()
			.enumerate()
			.take(limit)
			.filter(|(_, endpoint)| !endpoint.in_cooldown(now, cooldown))
			.map(|(index, endpoint)| (index, endpoint.clone()))
			.collect();
		if candidates.is_empty() {
			return None;
		}

		let mut outstanding: BTreeSet<usize> = candidates.iter().map(|(index, _)| *index).collect();
		let mut answered: BTreeMap<usize, Arc<dyn BlockchainTransport>> = BTreeMap::new();
		let mut failed = Vec::new();
		let mut probes: FuturesUnordered<_> = candidates
			.into_iter()
			.map(|(index, endpoint)| async move { (index, self.probe(&endpoint).await) })
			.collect();

		let mut winner = None;
		while let Some((index, outcome)) = probes.next().await {
			outstanding.remove(&index);
			match outcome {
				Some(transport) => {
					answered.insert(index, transport);
				}
				None => failed.push(index),
			}
			if let Some(&best) = answered.keys().next() {
				if outstanding.iter().all(|&pending| pending > best) {
					winner = answered.remove(&best).map(|transport| (best, transport));
					break;
				}
			}
		}
		drop(probes);

		for (_, transport) in answered {
			transport.close().await;
		}
		if !failed.is_empty() {
			let stamp = Instant::now();
			let mut endpoints = self.endpoints.write().await;
			for index in failed {
				if let Some(endpoint) = endpoints.get_mut(index) {
					endpoint.mark_failed(stamp);
				}
			}
		}
		winner
	}

	/// Opens a transport and checks that it answers the liveness probe within the timeout.
	async fn probe(&self, endpoint: &Endpoint) -> Option<Arc<dyn BlockchainTransport>> {
		let attempt = async {
			let transport = self.factory.connect(endpoint).await?;
			let reply = transport.send_raw_request(PROBE_METHOD, None).await?;
			if reply.get("result").is_none() {
				transport.close().await;
				return Err(TransportError::response_parse(
					format!("Probe reply without result: {}", reply),
					None,
					None,
				));
			}
			Ok::<_, TransportError>(transport)
		};

		match timeout(self.config.probe_timeout(), attempt).await {
			Ok(Ok(transport)) => Some(transport),
			Ok(Err(e)) => {
				warn!(endpoint = %endpoint.uri, error = %e, "Probe failed");
				None
			}
			Err(_) => {
				warn!(endpoint = %endpoint.uri, "Probe timed out");
				None
			}
		}
	}

	/// Makes `transport` the active connection and starts its watchers.
	async fn install(
		&self,
		endpoint_index: usize,
		transport: Arc<dyn BlockchainTransport>,
	) -> ActiveConnection {
		let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
		let connection = ActiveConnection {
			endpoint_index,
			uri: transport.endpoint_uri().to_string(),
			transport,
			generation,
		};
		let watchers = self.spawn_watchers(&connection).await;

		let previous = self.active.write().await.replace(ActiveSlot {
			connection: connection.clone(),
			watchers,
		});
		if let Some(previous) = previous {
			previous.shutdown().await;
		}

		metrics::record_provider_switch(&connection.uri);
		info!(
			endpoint = %connection.uri,
			generation,
			"Switched upstream provider"
		);
		connection
	}

	async fn spawn_watchers(&self, connection: &ActiveConnection) -> Vec<JoinHandle<()>> {
		let mut watchers = Vec::new();
		let pool = self.self_ref.clone();
		let generation = connection.generation;

		match timeout(
			self.config.probe_timeout(),
			connection.transport.subscribe_pending_transactions(),
		)
		.await
		{
			Ok(Ok(mut hashes)) => {
				let sender = self.pending_tx.clone();
				let pool = pool.clone();
				let uri = connection.uri.clone();
				watchers.push(tokio::spawn(async move {
					while let Some(hash) = hashes.recv().await {
						// No subscribers is fine.
						let _ = sender.send(hash);
					}
					// Reconnecting is the only way to get a fresh subscription.
					warn!(endpoint = %uri, "Mempool stream ended");
					if let Some(pool) = pool.upgrade() {
						pool.report_failure(generation).await;
					}
				}));
			}
			Ok(Err(e)) => {
				warn!(
					endpoint = %connection.uri,
					error = %e,
					"Mempool subscription unavailable"
				);
			}
			Err(_) => {
				warn!(
					endpoint = %connection.uri,
					"Mempool subscription unavailable: no answer in time"
				);
			}
		}

		match connection.transport.disconnect_signal() {
			Some(mut signal) => {
				watchers.push(tokio::spawn(async move {
					if signal.wait_for(|closed| *closed).await.is_ok() {
						if let Some(pool) = pool.upgrade() {
							pool.report_failure(generation).await;
						}
					}
				}));
			}
			None => {
				let transport = connection.transport.clone();
				let interval = self.config.ping_interval();
				let probe_timeout = self.config.probe_timeout();
				watchers.push(tokio::spawn(async move {
					loop {
						sleep(interval).await;
						let alive = matches!(
							timeout(probe_timeout, transport.send_raw_request(PROBE_METHOD, None)).await,
							Ok(Ok(ref reply)) if reply.get("result").is_some()
						);
						if !alive {
							if let Some(pool) = pool.upgrade() {
								pool.report_failure(generation).await;
							}
							break;
						}
					}
				}));
			}
		}

		watchers
	}
}
