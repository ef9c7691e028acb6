//! Bootstrap module for initializing services and running the startup sequence.
//!
//! This module wires the connection pool, chain reader, sync engines, leader election and
//! publisher together. It also supervises the spawned tasks: every fatal error they end with is
//! raised on the process-wide [`FatalSignal`].

use anyhow::Context;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, instrument, warn};

use crate::{
	models::IndexerConfig,
	services::{
		blockchain::{ChainReader, ConnectionPool, EvmChainReader, TransportFactory},
		blocksync::{EventHub, HistoricalBackfillEngine, LiveTailEngine},
		bus::EventBus,
		election::LeaderElector,
		notification::{AccountFilter, TxPublisher},
		scheduler::{schedule_reprobe, JobSchedulerTrait},
		storage::{BlockWriter, PersistenceGateway},
	},
	utils::fatal::FatalSignal,
};

/// External collaborators the indexer runs against
pub struct Collaborators {
	pub bus: Arc<dyn EventBus>,
	pub store: Arc<dyn PersistenceGateway>,
	pub accounts: Arc<dyn AccountFilter>,
	pub transports: Arc<dyn TransportFactory>,
}

/// A fully wired indexer
pub struct Indexer {
	config: IndexerConfig,
	fatal: FatalSignal,
	pool: Arc<ConnectionPool>,
	elector: Arc<LeaderElector>,
	events: Arc<EventHub>,
	backfill: Arc<HistoricalBackfillEngine>,
	tail: Arc<LiveTailEngine>,
	publisher: Arc<TxPublisher>,
	scheduler: Mutex<Option<JobScheduler>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Creates every service from `config`.
///
/// # Arguments
/// * `config` - Validated configuration
/// * `collaborators` - Bus, store, account registry and transport factory
///
/// # Returns
/// * `Arc<Indexer>` - The wired indexer, not yet started
pub fn initialize_services(config: IndexerConfig, collaborators: Collaborators) -> Arc<Indexer> {
	let fatal = FatalSignal::new();
	let pool = ConnectionPool::new(
		config.endpoints(),
		collaborators.transports,
		config.pool.clone(),
		fatal.clone(),
	);
	let reader: Arc<dyn ChainReader> =
		Arc::new(EvmChainReader::new(pool.clone(), config.rpc_timeout()));

	let elector = LeaderElector::new(
		&config.service_name,
		collaborators.bus.clone(),
		config.election.clone(),
		fatal.clone(),
	);
	let writer = BlockWriter::new(
		collaborators.store,
		config.write_concurrency,
		elector.state(),
	);
	let events = Arc::new(EventHub::new(config.event_buffer));

	let backfill = Arc::new(HistoricalBackfillEngine::new(
		reader.clone(),
		writer.clone(),
		events.clone(),
		config.backfill.clone(),
		config.consensus_depth as u64,
		config.providers.len(),
		config.network.clone(),
	));
	let tail = Arc::new(LiveTailEngine::new(
		reader,
		writer,
		events.clone(),
		config.tail.clone(),
		config.consensus_depth,
		config.network.clone(),
	));
	let publisher = Arc::new(TxPublisher::new(
		collaborators.bus,
		collaborators.accounts,
		config.service_name.clone(),
	));

	Arc::new(Indexer {
		config,
		fatal,
		pool,
		elector,
		events,
		backfill,
		tail,
		publisher,
		scheduler: Mutex::new(None),
		tasks: Mutex::new(Vec::new()),
	})
}

impl Indexer {
	/// Fires when a component hit an unrecoverable condition
	pub fn fatal(&self) -> &FatalSignal {
		&self.fatal
	}

	pub fn pool(&self) -> &Arc<ConnectionPool> {
		&self.pool
	}

	pub fn elector(&self) -> &Arc<LeaderElector> {
		&self.elector
	}

	pub fn tail(&self) -> &Arc<LiveTailEngine> {
		&self.tail
	}

	/// Runs the startup sequence.
	///
	/// Starts the election and the publisher, runs the history backfill, waits for it to finish
	/// unless shadow sync is enabled, then starts the live tail and the re-probe job. Returns
	/// early with an error when a fatal condition is raised meanwhile.
	#[instrument(skip_all, fields(network = %self.config.network))]
	pub async fn start(&self) -> anyhow::Result<()> {
		self.elector
			.start()
			.await
			.context("Failed to start leader election")?;
		self.spawn_publisher().await;

		let mut backfill_task = self.spawn_backfill();
		if self.config.shadow_sync {
			info!("Shadow sync enabled, starting the live tail alongside the backfill");
			self.tasks.lock().await.push(backfill_task);
		} else {
			let abort = backfill_task.abort_handle();
			tokio::select! {
				error = self.fatal.wait() => {
					abort.abort();
					anyhow::bail!("Startup aborted: {}", error);
				}
				result = &mut backfill_task => result.context("Backfill task panicked")?,
			}
		}
		if let Some(error) = self.fatal.current() {
			anyhow::bail!("Startup aborted: {}", error);
		}

		self.spawn_tail().await;
		self.schedule_jobs().await?;
		info!("Indexer started");
		Ok(())
	}

	/// Stops the engines, the election, the scheduler and the pool.
	pub async fn stop(&self) {
		self.backfill.stop_sync();
		self.tail.stop_sync();
		self.elector.stop().await;
		if let Some(mut scheduler) = self.scheduler.lock().await.take() {
			if let Err(e) = JobSchedulerTrait::shutdown(&mut scheduler).await {
				warn!(error = %e, "Failed to shut down scheduler");
			}
		}
		for task in self.tasks.lock().await.drain(..) {
			task.abort();
		}
		self.pool.stop().await;
		info!("Indexer stopped");
	}

	async fn spawn_publisher(&self) {
		let receiver = self.events.subscribe();
		let publisher = self.publisher.clone();
		let fatal = self.fatal.clone();
		let task = tokio::spawn(async move {
			if let Err(e) = publisher.run(receiver).await {
				fatal.raise("publisher", e.to_string());
			}
		});
		self.tasks.lock().await.push(task);
	}

	/// Runs the backfill, retrying transient failures until it completes or a fatal error occurs.
	fn spawn_backfill(&self) -> JoinHandle<()> {
		let backfill = self.backfill.clone();
		let fatal = self.fatal.clone();
		let retry_delay = self.config.backfill.retry_delay();
		tokio::spawn(async move {
			loop {
				match backfill.sync().await {
					Ok(plan) => {
						info!(target_height = plan.target_height, "Backfill finished");
						return;
					}
					Err(e) if e.is_fatal() => {
						fatal.raise("backfill", e.to_string());
						return;
					}
					Err(_) if backfill.is_stopped() => return,
					Err(e) => {
						warn!(error = %e, "Backfill failed, retrying");
						sleep(retry_delay).await;
					}
				}
			}
		})
	}

	async fn spawn_tail(&self) {
		let tail = self.tail.clone();
		let fatal = self.fatal.clone();
		let task = tokio::spawn(async move {
			if let Err(e) = tail.run().await {
				fatal.raise("live_tail", e.to_string());
			}
		});
		self.tasks.lock().await.push(task);
	}

	async fn schedule_jobs(&self) -> anyhow::Result<()> {
		let scheduler = <JobScheduler as JobSchedulerTrait>::new()
			.await
			.map_err(|e| anyhow::anyhow!("Failed to create scheduler: {}", e))?;
		schedule_reprobe(&scheduler, self.pool.clone(), &self.config.pool.reprobe_cron)
			.await
			.context("Failed to schedule re-probe")?;
		JobSchedulerTrait::start(&scheduler)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to start scheduler: {}", e))?;
		*self.scheduler.lock().await = Some(scheduler);
		Ok(())
	}
}
