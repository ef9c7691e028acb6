//! Blockchain indexing middleware.
//!
//! Ingests blocks and transactions from one or more Ethereum nodes, persists a normalized copy
//! and republishes account-relevant events on a message bus. Redundant instances elect a single
//! leader; only the leader writes.
//!
//! # Architecture
//!
//! - `models`: domain types, raw node reply shapes and configuration
//! - `services`: connection pool, chain reader, sync engines, election and publishing
//! - `bootstrap`: wiring of the services and the startup sequence
//! - `utils`: logging, metrics, the fatal signal and test helpers
//!
//! # Flow
//!
//! 1. The leader election starts
//! 2. The history backfill reconciles the store with the chain and fills the gaps
//! 3. The live tail follows the head, rolling back reorganizations
//! 4. Persisted blocks and mempool transactions are published for registered accounts

pub mod bootstrap;
pub mod models;
pub mod services;
pub mod utils;
