//! Tag parsing and tag-to-label mapping.
//!
//! Pingdom tags are free-form strings. With tag parsing enabled each tag name
//! is matched against a two-group pattern (`key:value` by default) and the
//! captures become metric labels, either one sample per tag or one
//! consolidated sample per check over a fixed whitelist of keys.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ConfigError;

/// Default tag pattern: `key:value` with a word-character key.
pub const DEFAULT_TAG_FORMAT: &str = "^([a-zA-Z0-9_]+):(.+)$";

/// Prefix of every label derived from the extra-label whitelist.
const EXTRA_LABEL_PREFIX: &str = "label_";

static NON_ALNUM_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9]+").expect("static regex"));

/// Compiled tag-parsing pattern with at least two capture groups.
#[derive(Debug, Clone)]
pub struct TagPattern {
    regex: Regex,
}

impl TagPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidTagFormat {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len() counts the implicit whole-match group
        if regex.captures_len() < 3 {
            return Err(ConfigError::InvalidTagFormat {
                pattern: pattern.to_string(),
                reason: "pattern needs two capture groups (key and value)".to_string(),
            });
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Result of parsing one tag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagLabel {
    pub key: String,
    pub value: String,
    pub matched: bool,
}

/// Parses a tag name into a key/value pair.
///
/// Either both captures are present and `matched` is set, or the result is
/// empty. A match where one of the two groups did not participate counts as
/// no match.
pub fn parse_tag_label(tag_name: &str, pattern: &TagPattern) -> TagLabel {
    let Some(caps) = pattern.regex.captures(tag_name) else {
        return TagLabel::default();
    };
    match (caps.get(1), caps.get(2)) {
        (Some(key), Some(value)) => TagLabel {
            key: key.as_str().to_string(),
            value: value.as_str().to_string(),
            matched: true,
        },
        _ => TagLabel::default(),
    }
}

/// Converts a raw label name into snake_case (`TeamName` → `team_name`).
pub fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    for (i, c) in input.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    NON_ALNUM_RUN
        .replace_all(&out, "_")
        .trim_matches('_')
        .to_string()
}

/// Ordered whitelist of tag keys promoted to labels of `pingdom_tags_label`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraLabelConfig {
    /// (raw key, derived label name) in first-seen order.
    entries: Vec<(String, String)>,
}

impl ExtraLabelConfig {
    /// Builds the whitelist from a comma-separated list such as `"Env, Team-Name"`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for item in raw.split(',') {
            let key = item.trim();
            if key.is_empty() || entries.iter().any(|(k, _)| k == key) {
                continue;
            }
            let snake = to_snake_case(key);
            if snake.is_empty() {
                return Err(ConfigError::InvalidExtraLabel {
                    label: key.to_string(),
                    reason: "no alphanumeric characters".to_string(),
                });
            }
            let label = format!("{}{}", EXTRA_LABEL_PREFIX, snake);
            if let Some((other, _)) = entries.iter().find(|(_, l)| *l == label) {
                return Err(ConfigError::InvalidExtraLabel {
                    label: key.to_string(),
                    reason: format!("maps to {} like {:?}", label, other),
                });
            }
            entries.push((key.to_string(), label));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Raw keys in configured order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Derived label name for a raw key.
    pub fn label_for(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, l)| l.as_str())
    }

    /// Derived label names in configured order.
    pub fn label_names(&self) -> Vec<String> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }

    /// One value per configured key, empty string where the check has none.
    pub fn values_in_order(&self, parsed: &HashMap<String, String>) -> Vec<String> {
        self.keys()
            .map(|k| parsed.get(k).cloned().unwrap_or_default())
            .collect()
    }
}

/// How tags are turned into samples. Fixed for the life of the process.
#[derive(Debug, Clone)]
pub enum TagPolicy {
    /// One `pingdom_tags` sample per tag.
    Plain,
    /// One `pingdom_tags_label` sample per matched tag.
    PerTag(TagPattern),
    /// One `pingdom_tags_label` sample per check over the whitelisted keys.
    ExtraLabels {
        pattern: TagPattern,
        labels: ExtraLabelConfig,
    },
}

impl TagPolicy {
    /// Picks the policy from the parsing switch, pattern and whitelist.
    pub fn from_settings(
        parse_tags: bool,
        tag_format: &str,
        extra_labels: &str,
    ) -> Result<Self, ConfigError> {
        if !parse_tags {
            return Ok(TagPolicy::Plain);
        }
        let pattern = TagPattern::new(tag_format)?;
        let labels = ExtraLabelConfig::parse(extra_labels)?;
        if labels.is_empty() {
            Ok(TagPolicy::PerTag(pattern))
        } else {
            Ok(TagPolicy::ExtraLabels { pattern, labels })
        }
    }
}
