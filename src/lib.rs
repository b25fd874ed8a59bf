//! # Commvault Exporter
//!
//! A Prometheus metrics exporter for Commvault.
//!
//! ## Overview
//!
//! The exporter logs in to the Commvault web console once, then polls two
//! endpoints on a fixed interval:
//!
//! - VM status list (protection status, SLA status, plan, last backup, sizes)
//! - V4 disk storage pools (capacity, free and used space, in raw API units)
//!
//! Each poll publishes an immutable snapshot. Scrapes of `/metrics` render the
//! latest snapshots on demand and never touch the Commvault API.
//!
//! ## Quick Start
//!
//! ```no_run
//! use commvault_exporter::{
//!     client::CommvaultClient, config::Settings, metrics::MetricsCollector, poller::Poller,
//!     server::start_server, snapshot::SnapshotStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(None)?;
//!     let host = settings.commvault.host_label();
//!
//!     let mut client = CommvaultClient::new(settings.commvault)?;
//!     client.login().await?;
//!
//!     let snapshots = Arc::new(SnapshotStore::new());
//!     let poller = Poller::new(client, snapshots.clone());
//!     poller.refresh().await;
//!     poller.spawn();
//!
//!     let metrics = MetricsCollector::new(snapshots, host)?;
//!     start_server(&settings.exporter.listen_address, metrics).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The exporter can be configured via:
//! - TOML configuration file
//! - Environment variables (with `COMMVAULT_EXPORTER_` prefix)
//! - `COMMVAULT_REQUEST_URI`, `COMMVAULT_REQUEST_USER`, `COMMVAULT_REQUEST_PASSWORD`,
//!   `COMMVAULT_REQUEST_TLS_VERIFY`, `REQUEST_TIMEOUT` and `REQUEST_INTERVAL`
//! - Command-line arguments
//!
//! See [`config::Settings`] for details.
//!
//! ## Modules
//!
//! - [`client`] - Commvault API client
//! - [`collectors`] - Snapshot to metric transformers
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`metrics`] - Prometheus metrics definitions and rendering
//! - [`poller`] - Background polling loop
//! - [`server`] - HTTP server for exposing metrics
//! - [`snapshot`] - Latest-response snapshots

pub mod client;
pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod server;
pub mod snapshot;

pub use error::{CommvaultError, Result};
