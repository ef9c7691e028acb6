//! Configuration loading and validation.
//!
//! The indexer reads one JSON file and then applies environment overrides using the variable
//! names of the legacy deployment (`WEB3_URI`, `RABBIT_SERVICE_NAME`, `NETWORK`, ...).

use async_trait::async_trait;
use std::path::Path;

mod error;
mod indexer_config;

pub use error::ConfigError;
pub use indexer_config::{
	BackfillConfig, ElectionConfig, IndexerConfig, PoolConfig, TailConfig,
};

/// Common interface for loading configuration
#[async_trait]
pub trait ConfigLoader: Sized {
	/// Load configuration from a specific file path
	async fn load_from_path(path: &Path) -> Result<Self, ConfigError>;

	/// Validate the configuration
	///
	/// Returns Ok(()) if valid, or an error message if invalid.
	fn validate(&self) -> Result<(), ConfigError>;

	/// Check if a file is a JSON file based on extension
	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.map(|ext| ext.eq_ignore_ascii_case("json"))
			.unwrap_or(false)
	}
}
