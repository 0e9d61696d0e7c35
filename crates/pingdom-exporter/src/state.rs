//! Shared application state.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use axum::extract::State;
use prometheus::Registry;

use pingdom_core::{Collector, PingdomClient};

pub(crate) struct ExporterInner {
    pub(crate) collector: Collector<PingdomClient>,
    pub(crate) metrics_path: String,
    /// Lives for the whole process; gathered next to every scrape.
    pub(crate) process_registry: Registry,
}

pub(crate) type SharedState = Arc<ExporterInner>;

pub(crate) type AppState = State<SharedState>;

/// Registry with the exporter's own process metrics (CPU, memory, fds).
/// Empty on platforms without procfs.
pub(crate) fn process_registry() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    {
        use prometheus::process_collector::ProcessCollector;
        registry.register(Box::new(ProcessCollector::for_self()))?;
    }
    Ok(registry)
}
