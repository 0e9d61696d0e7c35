//! Pingdom data model: checks, tags and outage-summary states.
//!
//! Field names follow the Pingdom 3.1 JSON payloads so the same types are
//! decoded by the HTTP client and built by hand in tests.

use serde::Deserialize;

/// Tag that excludes a check from every metric for the scrape.
pub const IGNORE_TAG: &str = "pingdom_exporter_ignored";

/// One monitored endpoint as reported by `GET /checks`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Check {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    /// Poll resolution, in minutes.
    #[serde(default)]
    pub resolution: i64,
    #[serde(default)]
    pub status: String,
    /// Last measured response time, in milliseconds.
    #[serde(default, rename = "lastresponsetime")]
    pub last_response_time: i64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Tags assigned through the second vendor-side source.
    #[serde(default)]
    pub custom_tags: Vec<Tag>,
}

impl Check {
    /// Both tag sources, `tags` first. Duplicates are kept.
    pub fn all_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().chain(self.custom_tags.iter())
    }

    pub fn has_ignore_tag(&self) -> bool {
        self.all_tags().any(|t| t.name == IGNORE_TAG)
    }

    pub fn is_up(&self) -> bool {
        self.status == "up"
    }

    pub fn is_paused(&self) -> bool {
        self.status == "paused"
    }

    pub fn response_time_seconds(&self) -> f64 {
        self.last_response_time as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "count_from_any")]
    pub count: i64,
}

/// Pingdom sends `count` as a number on some endpoints and as a string on others.
fn count_from_any<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Int(i64),
        Str(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Int(n) => Ok(n),
        Count::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One contiguous state span of a check, from `GET /summary.outage/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutageInterval {
    pub status: String,
    #[serde(rename = "timefrom")]
    pub from: i64,
    #[serde(rename = "timeto")]
    pub to: i64,
}

impl OutageInterval {
    pub fn duration_seconds(&self) -> f64 {
        (self.to - self.from) as f64
    }
}

/// Look-back window shared by every outage fetch of one scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutageWindow {
    pub from: i64,
    pub to: i64,
}

impl OutageWindow {
    /// Window of `period_days` ending at `now` (epoch seconds).
    pub fn ending_at(now: i64, period_days: u32) -> Self {
        Self {
            from: now - i64::from(period_days) * 86_400,
            to: now,
        }
    }

    pub fn seconds(&self) -> f64 {
        (self.to - self.from) as f64
    }
}
