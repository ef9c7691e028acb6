//! Utility modules shared across the crate.
//!
//! - `fatal`: process-wide fatal condition signal
//! - `logging`: tracing setup and error context
//! - `metrics`: Prometheus registry and helpers
//! - `tests`: builders and fakes for unit and integration tests

pub mod fatal;
pub mod logging;
pub mod metrics;
