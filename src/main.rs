//! Blockchain indexing middleware entry point.
//!
//! Loads the configuration (a JSON file given as the first argument or in `CONFIG_PATH`,
//! otherwise defaults) with environment overrides, wires the services and runs until Ctrl-C or
//! a fatal condition.
//!
//! # Exit codes
//! * `0` - Stopped with Ctrl-C
//! * `1` - Startup failed or a fatal condition was raised (upstream, broker or store lost)

use anyhow::Context;
use std::{path::PathBuf, process, sync::Arc};
use tracing::{error, info};

use eth_blockprocessor::{
	bootstrap::{initialize_services, Collaborators},
	models::{ConfigLoader, IndexerConfig},
	services::{
		blockchain::DefaultTransportFactory, bus::InMemoryBus,
		notification::InMemoryAccountRegistry, storage::InMemoryStore,
	},
	utils::logging::setup_logging,
};

async fn load_config() -> anyhow::Result<IndexerConfig> {
	let path = std::env::args()
		.nth(1)
		.or_else(|| std::env::var("CONFIG_PATH").ok())
		.map(PathBuf::from);

	let config = match path {
		Some(path) => IndexerConfig::load_from_path(&path)
			.await
			.with_context(|| format!("Failed to load configuration from {}", path.display()))?
			.apply_env(|key| std::env::var(key).ok())?,
		None => IndexerConfig::from_env()?,
	};
	config.validate().context("Invalid configuration")?;
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	setup_logging().map_err(|e| anyhow::anyhow!("Failed to set up logging: {}", e))?;

	let config = match load_config().await {
		Ok(config) => config,
		Err(e) => {
			error!("{:#}", e);
			process::exit(1);
		}
	};
	info!(
		network = %config.network,
		providers = ?config.providers,
		service = %config.service_name,
		"Starting indexer"
	);

	let transports = DefaultTransportFactory::new(
		config.rpc_timeout(),
		config.pool.mempool_poll_interval(),
	)
	.context("Failed to create transport factory")?;
	let indexer = initialize_services(
		config,
		Collaborators {
			bus: Arc::new(InMemoryBus::new()),
			store: Arc::new(InMemoryStore::new()),
			accounts: Arc::new(InMemoryAccountRegistry::new()),
			transports: Arc::new(transports),
		},
	);

	tokio::select! {
		result = indexer.start() => {
			if let Err(e) = result {
				error!("{:#}", e);
				indexer.stop().await;
				process::exit(1);
			}
		}
		_ = tokio::signal::ctrl_c() => {
			info!("Shutdown signal received during startup");
			indexer.stop().await;
			return Ok(());
		}
	}

	tokio::select! {
		fatal = indexer.fatal().wait() => {
			error!(component = fatal.component, "Exiting: {}", fatal.message);
			indexer.stop().await;
			process::exit(1);
		}
		_ = tokio::signal::ctrl_c() => {
			info!("Shutdown signal received");
			indexer.stop().await;
		}
	}
	Ok(())
}
