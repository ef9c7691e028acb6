//! Metrics module for the application.
//!
//! - This module contains the global Prometheus registry.
//! - Defines the indexing metrics and the helpers used by the services to update them.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
	/// Global Prometheus registry.
	///
	/// This registry holds all metrics defined in this module and is used
	/// to gather metrics for exposure via the metrics endpoint.
	pub static ref REGISTRY: Registry = Registry::new();

	/// Counter for persisted blocks.
	///
	/// Labeled by the engine that persisted the block (`backfill` or `tail`).
	pub static ref BLOCKS_PERSISTED_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("blocks_persisted_total", "Total number of persisted blocks"),
			&["source"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Counter for detected chain reorganizations.
	pub static ref REORGS_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("reorgs_total", "Total number of detected chain reorganizations"),
			&["network"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Counter for blocks removed by reorg rollbacks.
	pub static ref ROLLED_BACK_BLOCKS_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("rolled_back_blocks_total", "Total number of blocks deleted by rollbacks"),
			&["network"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Counter for upstream provider switches, labeled by the endpoint switched to.
	pub static ref PROVIDER_SWITCHES_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("provider_switches_total", "Total number of upstream provider switches"),
			&["endpoint"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Counter for persisted mempool transactions.
	pub static ref UNCONFIRMED_TXS_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("unconfirmed_transactions_total", "Total number of persisted unconfirmed transactions"),
			&["network"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Counter for gaps found by the history reconciliation.
	pub static ref GAPS_DISCOVERED_TOTAL: CounterVec = {
		let counter = CounterVec::new(
			Opts::new("gaps_discovered_total", "Total number of history gaps discovered"),
			&["network"]
		).unwrap();
		REGISTRY.register(Box::new(counter.clone())).unwrap();
		counter
	};

	/// Gauge set to 1 while this instance is the leader.
	pub static ref IS_LEADER: Gauge = {
		let gauge = Gauge::new("is_leader", "Whether this instance currently holds leadership").unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};

	/// Gauge for the live tail cursor height.
	pub static ref CURSOR_HEIGHT: GaugeVec = {
		let gauge = GaugeVec::new(
			Opts::new("cursor_height", "Next block height the live tail will fetch"),
			&["network"]
		).unwrap();
		REGISTRY.register(Box::new(gauge.clone())).unwrap();
		gauge
	};
}

/// Gather all metrics and encode into the provided format.
pub fn gather_metrics() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
	let encoder = TextEncoder::new();
	let metric_families = REGISTRY.gather();
	let mut buffer = Vec::new();
	encoder.encode(&metric_families, &mut buffer)?;
	Ok(buffer)
}

/// Records a persisted block.
///
/// # Arguments
/// * `source` - The engine that persisted the block (`backfill` or `tail`)
pub fn record_block_persisted(source: &str) {
	BLOCKS_PERSISTED_TOTAL.with_label_values(&[source]).inc();
}

/// Records a reorg and the number of blocks its rollback removed.
pub fn record_reorg(network: &str, rolled_back: u64) {
	REORGS_TOTAL.with_label_values(&[network]).inc();
	ROLLED_BACK_BLOCKS_TOTAL
		.with_label_values(&[network])
		.inc_by(rolled_back as f64);
}

/// Records a switch of the active upstream connection.
pub fn record_provider_switch(endpoint: &str) {
	PROVIDER_SWITCHES_TOTAL.with_label_values(&[endpoint]).inc();
}

/// Records a persisted unconfirmed transaction.
pub fn record_unconfirmed_tx(network: &str) {
	UNCONFIRMED_TXS_TOTAL.with_label_values(&[network]).inc();
}

/// Records the number of gaps found by one reconciliation.
pub fn record_gaps(network: &str, count: usize) {
	GAPS_DISCOVERED_TOTAL
		.with_label_values(&[network])
		.inc_by(count as f64);
}

/// Publishes the leadership status.
pub fn set_leader(is_leader: bool) {
	IS_LEADER.set(if is_leader { 1.0 } else { 0.0 });
}

/// Publishes the live tail cursor height.
pub fn set_cursor_height(network: &str, height: u64) {
	CURSOR_HEIGHT.with_label_values(&[network]).set(height as f64);
}
