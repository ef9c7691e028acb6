//! Indexer configuration model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

use crate::models::{ConfigError, ConfigLoader, Endpoint};

/// Upstream connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Timeout of one liveness probe
	pub probe_timeout_ms: u64,
	/// How long a failed endpoint is skipped
	pub failure_cooldown_ms: u64,
	/// Delay between probe rounds when nothing answered
	pub retry_delay_ms: u64,
	/// Liveness ping period for transports without a disconnect signal
	pub ping_interval_ms: u64,
	/// Probe rounds before the pool gives up
	pub max_switch_attempts: u32,
	/// Cron schedule of the periodic re-probe
	pub reprobe_cron: String,
	/// Poll period of the pending transaction filter on HTTP endpoints
	pub mempool_poll_interval_ms: u64,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			probe_timeout_ms: 5_000,
			failure_cooldown_ms: 5_000,
			retry_delay_ms: 5_000,
			ping_interval_ms: 5_000,
			max_switch_attempts: 3,
			reprobe_cron: "0 */5 * * * *".to_string(),
			mempool_poll_interval_ms: 1_000,
		}
	}
}

impl PoolConfig {
	pub fn probe_timeout(&self) -> Duration {
		Duration::from_millis(self.probe_timeout_ms)
	}

	pub fn failure_cooldown(&self) -> Duration {
		Duration::from_millis(self.failure_cooldown_ms)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	pub fn ping_interval(&self) -> Duration {
		Duration::from_millis(self.ping_interval_ms)
	}

	pub fn mempool_poll_interval(&self) -> Duration {
		Duration::from_millis(self.mempool_poll_interval_ms)
	}
}

/// History backfill settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
	/// Initial gap discovery chunk size
	pub chunk_size: u64,
	/// Delay before a failed block is fetched again
	pub retry_delay_ms: u64,
}

impl Default for BackfillConfig {
	fn default() -> Self {
		Self {
			chunk_size: 10_000,
			retry_delay_ms: 5_000,
		}
	}
}

impl BackfillConfig {
	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}
}

/// Live tail settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
	/// Delay while waiting for the next block
	pub poll_interval_ms: u64,
	/// Delay after a transient upstream failure
	pub retry_delay_ms: u64,
}

impl Default for TailConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: 10_000,
			retry_delay_ms: 5_000,
		}
	}
}

impl TailConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}
}

/// Leader election timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
	/// How long a round waits for a `setMaster` answer
	pub find_window_ms: u64,
	/// How long a round waits after self-promotion before it counts as synced
	pub sync_window_ms: u64,
	/// Round period once a leader is known
	pub round_interval_ms: u64,
	/// Round period while no leader has been observed
	pub retry_interval_ms: u64,
}

impl Default for ElectionConfig {
	fn default() -> Self {
		Self {
			find_window_ms: 2_000,
			sync_window_ms: 2_000,
			round_interval_ms: 10_000,
			retry_interval_ms: 2_000,
		}
	}
}

impl ElectionConfig {
	pub fn find_window(&self) -> Duration {
		Duration::from_millis(self.find_window_ms)
	}

	pub fn sync_window(&self) -> Duration {
		Duration::from_millis(self.sync_window_ms)
	}

	pub fn round_interval(&self) -> Duration {
		Duration::from_millis(self.round_interval_ms)
	}

	pub fn retry_interval(&self) -> Duration {
		Duration::from_millis(self.retry_interval_ms)
	}
}

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
	/// Prefix of every bus topic
	pub service_name: String,
	/// Network label used in logs, metrics and the default socket path
	pub network: String,
	/// Upstream endpoints, highest priority first
	pub providers: Vec<String>,
	/// Trailing blocks treated as not final
	pub consensus_depth: usize,
	/// Concurrent block writes allowed through the write gate
	pub write_concurrency: usize,
	/// Timeout of every upstream call
	pub rpc_timeout_ms: u64,
	/// Start the live tail without waiting for the backfill to finish
	pub shadow_sync: bool,
	/// Capacity of every event subscriber queue
	pub event_buffer: usize,
	pub pool: PoolConfig,
	pub backfill: BackfillConfig,
	pub tail: TailConfig,
	pub election: ElectionConfig,
}

impl Default for IndexerConfig {
	fn default() -> Self {
		let network = "development".to_string();
		Self {
			service_name: "app_eth".to_string(),
			providers: vec![format!("/tmp/{}/geth.ipc", network)],
			network,
			consensus_depth: 12,
			write_concurrency: 1,
			rpc_timeout_ms: 10_000,
			shadow_sync: false,
			event_buffer: 256,
			pool: PoolConfig::default(),
			backfill: BackfillConfig::default(),
			tail: TailConfig::default(),
			election: ElectionConfig::default(),
		}
	}
}

impl IndexerConfig {
	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_millis(self.rpc_timeout_ms)
	}

	/// Endpoints in priority order.
	pub fn endpoints(&self) -> Vec<Endpoint> {
		self.providers.iter().map(Endpoint::new).collect()
	}

	/// Applies environment overrides read through `lookup`.
	///
	/// # Arguments
	/// * `lookup` - Returns the value of an environment variable, if set
	///
	/// # Returns
	/// * `Result<Self, ConfigError>` - Updated configuration or a parse error for a malformed value
	pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(network) = lookup("NETWORK") {
			let default_socket = format!("/tmp/{}/geth.ipc", self.network);
			if self.providers == vec![default_socket] {
				self.providers = vec![format!("/tmp/{}/geth.ipc", network)];
			}
			self.network = network;
		}
		if let Some(name) = lookup("RABBIT_SERVICE_NAME") {
			self.service_name = name;
		}
		if let Some(uris) = lookup("PROVIDERS").or_else(|| lookup("WEB3_URI")) {
			self.providers = uris
				.split(',')
				.map(str::trim)
				.filter(|uri| !uri.is_empty())
				.map(String::from)
				.collect();
		}
		if let Some(shadow) = lookup("SYNC_SHADOW") {
			self.shadow_sync = matches!(shadow.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
		}
		if let Some(depth) = lookup("CONSENSUS_DEPTH") {
			self.consensus_depth = depth.parse().map_err(|e| {
				ConfigError::parse_error(
					format!("CONSENSUS_DEPTH is not a number: {}", depth),
					Some(Box::new(e)),
					None,
				)
			})?;
		}
		Ok(self)
	}

	/// Defaults with the process environment applied.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::default().apply_env(|key| std::env::var(key).ok())
	}
}

fn validation_error(message: &str, field: &str) -> ConfigError {
	ConfigError::validation_error(
		message,
		None,
		Some(HashMap::from([("field".to_string(), field.to_string())])),
	)
}

fn is_cron_expression(expression: &str) -> bool {
	let fields = expression.split_whitespace().count();
	(6..=7).contains(&fields)
}

#[async_trait]
impl ConfigLoader for IndexerConfig {
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		if !Self::is_json_file(path) {
			return Err(ConfigError::file_error(
				format!("Configuration file must be JSON: {}", path.display()),
				None,
				None,
			));
		}
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::file_error(
				format!("Failed to read configuration file: {}", path.display()),
				Some(Box::new(e)),
				None,
			)
		})?;
		let config: IndexerConfig = serde_json::from_str(&content).map_err(|e| {
			ConfigError::parse_error(
				format!("Failed to parse configuration file: {}", path.display()),
				Some(Box::new(e)),
				None,
			)
		})?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.service_name.trim().is_empty() {
			return Err(validation_error("Service name is required", "service_name"));
		}
		if self.providers.is_empty() {
			return Err(validation_error(
				"At least one provider is required",
				"providers",
			));
		}
		if self.consensus_depth == 0 {
			return Err(validation_error(
				"Consensus depth must be greater than 0",
				"consensus_depth",
			));
		}
		if self.write_concurrency == 0 {
			return Err(validation_error(
				"Write concurrency must be greater than 0",
				"write_concurrency",
			));
		}
		if self.event_buffer == 0 {
			return Err(validation_error(
				"Event buffer must be greater than 0",
				"event_buffer",
			));
		}
		if self.backfill.chunk_size == 0 {
			return Err(validation_error(
				"Backfill chunk size must be greater than 0",
				"backfill.chunk_size",
			));
		}
		let timeouts = [
			("rpc_timeout_ms", self.rpc_timeout_ms),
			("pool.probe_timeout_ms", self.pool.probe_timeout_ms),
			("pool.ping_interval_ms", self.pool.ping_interval_ms),
			("tail.poll_interval_ms", self.tail.poll_interval_ms),
			("election.find_window_ms", self.election.find_window_ms),
			("election.round_interval_ms", self.election.round_interval_ms),
			("election.retry_interval_ms", self.election.retry_interval_ms),
		];
		if let Some((field, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
			return Err(validation_error("Timeouts must be greater than 0", field));
		}
		if self.pool.max_switch_attempts == 0 {
			return Err(validation_error(
				"Pool needs at least one probe round",
				"pool.max_switch_attempts",
			));
		}
		if !is_cron_expression(&self.pool.reprobe_cron) {
			return Err(validation_error(
				"Invalid re-probe cron expression",
				"pool.reprobe_cron",
			));
		}
		Ok(())
	}
}
