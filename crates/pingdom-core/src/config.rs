//! Exporter configuration, validated once at startup.

use std::time::Duration;

use crate::tags::TagPolicy;

/// Environment variable holding the Pingdom API token.
pub const TOKEN_ENV: &str = "PINGDOM_API_TOKEN";

/// Error type for startup configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// API token not provided.
    MissingToken,
    /// Tag pattern does not compile or lacks the two capture groups.
    InvalidTagFormat { pattern: String, reason: String },
    /// Extra-label entry cannot be turned into a unique label name.
    InvalidExtraLabel { label: String, reason: String },
    /// A numeric setting is out of range.
    OutOfRange(String),
    /// HTTP client could not be built.
    Client(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingToken => write!(
                f,
                "Pingdom API token must be provided via the {} environment variable",
                TOKEN_ENV
            ),
            ConfigError::InvalidTagFormat { pattern, reason } => {
                write!(f, "invalid tag format {:?}: {}", pattern, reason)
            }
            ConfigError::InvalidExtraLabel { label, reason } => {
                write!(f, "invalid extra label {:?}: {}", label, reason)
            }
            ConfigError::OutOfRange(msg) => write!(f, "{}", msg),
            ConfigError::Client(msg) => write!(f, "cannot create Pingdom client: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Immutable settings shared by every scrape.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Look-back window, in days.
    pub outage_check_period_days: u32,
    /// SLO percentage used when a check has no `uptime_slo_*` tag.
    pub default_uptime_slo: f64,
    /// Vendor-side tag filter passed to the check list call.
    pub tags_filter: String,
    pub tag_policy: TagPolicy,
    /// Upper bound on concurrent outage fetches. `None` fans out one task per check.
    pub max_concurrent_fetches: Option<usize>,
}

impl ExporterConfig {
    pub fn new(
        outage_check_period_days: u32,
        default_uptime_slo: f64,
        tags_filter: impl Into<String>,
        tag_policy: TagPolicy,
    ) -> Result<Self, ConfigError> {
        if outage_check_period_days == 0 {
            return Err(ConfigError::OutOfRange(
                "outage check period must be at least one day".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&default_uptime_slo) {
            return Err(ConfigError::OutOfRange(format!(
                "default uptime SLO {} is outside 0-100",
                default_uptime_slo
            )));
        }
        Ok(Self {
            outage_check_period_days,
            default_uptime_slo,
            tags_filter: tags_filter.into(),
            tag_policy,
            max_concurrent_fetches: None,
        })
    }

    /// Bounds the number of in-flight outage fetches per scrape.
    pub fn with_max_concurrent_fetches(mut self, limit: Option<usize>) -> Result<Self, ConfigError> {
        if limit == Some(0) {
            return Err(ConfigError::OutOfRange(
                "max concurrent fetches must be positive".to_string(),
            ));
        }
        self.max_concurrent_fetches = limit;
        Ok(self)
    }

    pub fn outage_check_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.outage_check_period_days) * 86_400)
    }
}
