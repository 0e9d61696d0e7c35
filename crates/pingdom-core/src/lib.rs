//! pingdom-core — Pingdom checks and outages as Prometheus gauges.
//!
//! Provides:
//! - `model` — checks, tags, outage intervals and the look-back window
//! - `api` — `ChecksApi` / `OutageApi` seams and `ApiError`
//! - `client` — reqwest implementation of the API seams
//! - `tags` — tag parsing, extra-label whitelist, tag policy
//! - `aggregation` — uptime/downtime/outage counts and SLO error budgets
//! - `sink` — metric descriptors and thread-safe sample sinks
//! - `collector` — the per-scrape collection pass
//! - `config` — validated exporter settings

pub mod aggregation;
pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod model;
pub mod sink;
pub mod tags;

pub use api::{ApiError, CheckFilter, ChecksApi, OutageApi};
pub use client::PingdomClient;
pub use collector::{Collector, ScrapeSummary};
pub use config::{ConfigError, ExporterConfig};
pub use sink::{Descriptors, MemorySink, MetricSink, RegistrySink};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
