//! Metric descriptors and sample sinks.
//!
//! The collector writes samples through [`MetricSink`], which must accept
//! concurrent producers. [`RegistrySink`] backs a fresh Prometheus registry
//! per scrape; [`MemorySink`] records samples for inspection.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::tags::TagPolicy;

/// Name, help text and label names of one exported metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: Vec<String>,
}

impl MetricDesc {
    fn new(name: &'static str, help: &'static str, labels: &[&str]) -> Self {
        Self {
            name,
            help,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

const CHECK_LABELS: &[&str] = &["id", "name", "hostname", "resolution", "paused"];
const OUTAGE_LABELS: &[&str] = &["id", "name", "hostname"];

/// Every metric the exporter can emit. Built once from the tag policy.
#[derive(Debug, Clone)]
pub struct Descriptors {
    pub up: MetricDesc,
    pub slo_period: MetricDesc,
    pub status: MetricDesc,
    pub response_time: MetricDesc,
    pub tags: MetricDesc,
    pub tags_label: MetricDesc,
    pub outages: MetricDesc,
    pub up_seconds: MetricDesc,
    pub down_seconds: MetricDesc,
    pub error_budget: MetricDesc,
    pub available_error_budget: MetricDesc,
}

impl Descriptors {
    pub fn new(policy: &TagPolicy) -> Self {
        let tags_label = match policy {
            TagPolicy::ExtraLabels { labels, .. } => {
                let mut names = vec!["id".to_string()];
                names.extend(labels.label_names());
                MetricDesc {
                    name: "pingdom_tags_label",
                    help: "The current tags of the check",
                    labels: names,
                }
            }
            _ => MetricDesc::new(
                "pingdom_tags_label",
                "The current tags of the check",
                &["id", "label_key", "label_value", "name"],
            ),
        };

        Self {
            up: MetricDesc::new(
                "pingdom_up",
                "Whether the last pingdom scrape was successful (1: up, 0: down)",
                &[],
            ),
            slo_period: MetricDesc::new(
                "pingdom_slo_period_seconds",
                "Outage check period, in seconds",
                &[],
            ),
            status: MetricDesc::new(
                "pingdom_uptime_status",
                "The current status of the check (1: up, 0: down)",
                CHECK_LABELS,
            ),
            response_time: MetricDesc::new(
                "pingdom_uptime_response_time_seconds",
                "The response time of last test, in seconds",
                CHECK_LABELS,
            ),
            tags: MetricDesc::new(
                "pingdom_tags",
                "The current tags of the check",
                &["id", "name", "type", "count"],
            ),
            tags_label,
            outages: MetricDesc::new(
                "pingdom_outages_total",
                "Number of outages within the outage check period",
                OUTAGE_LABELS,
            ),
            up_seconds: MetricDesc::new(
                "pingdom_up_seconds",
                "Total up time within the outage check period, in seconds",
                OUTAGE_LABELS,
            ),
            down_seconds: MetricDesc::new(
                "pingdom_down_seconds",
                "Total down time within the outage check period, in seconds",
                OUTAGE_LABELS,
            ),
            error_budget: MetricDesc::new(
                "pingdom_uptime_slo_error_budget_total_seconds",
                "Maximum number of allowed downtime, in seconds, according to the uptime SLO",
                OUTAGE_LABELS,
            ),
            available_error_budget: MetricDesc::new(
                "pingdom_uptime_slo_error_budget_available_seconds",
                "Number of seconds of downtime we can still have without breaking the uptime SLO",
                OUTAGE_LABELS,
            ),
        }
    }

    pub fn all(&self) -> [&MetricDesc; 11] {
        [
            &self.up,
            &self.slo_period,
            &self.status,
            &self.response_time,
            &self.tags,
            &self.tags_label,
            &self.outages,
            &self.up_seconds,
            &self.down_seconds,
            &self.error_budget,
            &self.available_error_budget,
        ]
    }
}

/// Receives gauge samples. Implementations must be safe for concurrent use;
/// each call carries one complete sample.
pub trait MetricSink: Send + Sync {
    fn emit(&self, desc: &MetricDesc, value: f64, label_values: &[String]);
}

/// Sink writing into a private Prometheus registry, one per scrape.
pub struct RegistrySink {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
}

impl RegistrySink {
    pub fn new(descriptors: &Descriptors) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();
        for desc in descriptors.all() {
            let labels: Vec<&str> = desc.labels.iter().map(String::as_str).collect();
            let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), &labels)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(desc.name, gauge);
        }
        Ok(Self { registry, gauges })
    }

    /// Encodes everything emitted so far in the Prometheus text format.
    /// Metrics that received no sample are left out.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        self.render_with(Vec::new())
    }

    /// Same as [`render`](Self::render), followed by families gathered
    /// elsewhere (e.g. a process-wide registry outliving the scrape).
    pub fn render_with(&self, extra: Vec<MetricFamily>) -> Result<String, prometheus::Error> {
        let mut families = self.registry.gather();
        families.extend(extra);
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricSink for RegistrySink {
    fn emit(&self, desc: &MetricDesc, value: f64, label_values: &[String]) {
        let Some(gauge) = self.gauges.get(desc.name) else {
            warn!(metric = desc.name, "emit for unregistered metric");
            return;
        };
        let values: Vec<&str> = label_values.iter().map(String::as_str).collect();
        match gauge.get_metric_with_label_values(&values) {
            Ok(g) => g.set(value),
            Err(e) => warn!(metric = desc.name, error = %e, "dropping sample"),
        }
    }
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that keeps every sample in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<Sample>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Samples of one metric whose `id` label equals `id`.
    pub fn for_check(&self, name: &str, id: &str) -> Vec<Sample> {
        self.samples()
            .into_iter()
            .filter(|s| s.name == name && s.label("id") == Some(id))
            .collect()
    }
}

impl MetricSink for MemorySink {
    fn emit(&self, desc: &MetricDesc, value: f64, label_values: &[String]) {
        debug_assert_eq!(
            desc.labels.len(),
            label_values.len(),
            "label arity mismatch for {}",
            desc.name
        );
        let labels = desc
            .labels
            .iter()
            .cloned()
            .zip(label_values.iter().cloned())
            .collect();
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Sample {
                name: desc.name.to_string(),
                value,
                labels,
            });
    }
}
