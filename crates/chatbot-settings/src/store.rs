//! Settings storage and typed retrieval

use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SettingsError;

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "!";

/// Replies delayed by less than this many seconds are sent right away
pub const DEFAULT_REPLY_DELAY_THRESHOLD: f64 = 1.0;

/// Scheduled entries fired per tick
pub const DEFAULT_DRAIN_CAP: usize = 4;

// =============================================================================
// Settings
// =============================================================================

/// Configuration values consumed by the command engine
///
/// Built from an already-loaded JSON document. Unknown keys are preserved in
/// an `extra` map and exposed through the typed getters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Command prefixes, tried in order
    #[serde(deserialize_with = "one_or_many")]
    prefixes: Vec<String>,
    /// Whether top-level command lookup ignores case
    case_insensitive: bool,
    /// Threshold (seconds) below which delayed replies are sent immediately
    reply_delay_threshold: f64,
    /// Maximum scheduled entries fired per tick
    drain_cap: usize,
    /// Default for commands that do not set `ignore_extra`
    ignore_extra_default: bool,
    /// Every other key, kept verbatim
    #[serde(flatten)]
    extra: AHashMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            prefixes: vec![DEFAULT_PREFIX.to_string()],
            case_insensitive: false,
            reply_delay_threshold: DEFAULT_REPLY_DELAY_THRESHOLD,
            drain_cap: DEFAULT_DRAIN_CAP,
            ignore_extra_default: true,
            extra: AHashMap::new(),
        }
    }
}

/// Accept either `"!"` or `["!", "?"]`
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Name of a JSON value's type, for error messages
fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Settings {
    /// Create settings with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and validate a JSON payload
    pub fn from_json(payload: &str) -> Result<Self, SettingsError> {
        let mut settings: Settings = serde_json::from_str(payload)?;
        settings.absorb_single_prefix()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Fold a single `prefix` key into `prefixes`
    fn absorb_single_prefix(&mut self) -> Result<(), SettingsError> {
        if let Some(value) = self.extra.remove("prefix") {
            self.prefixes = match value {
                Value::String(s) => vec![s],
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        other => Err(SettingsError::TypeMismatch {
                            name: "prefix".to_string(),
                            expected: "string",
                            actual: value_kind(&other),
                        }),
                    })
                    .collect::<Result<_, _>>()?,
                other => {
                    return Err(SettingsError::TypeMismatch {
                        name: "prefix".to_string(),
                        expected: "string",
                        actual: value_kind(&other),
                    })
                }
            };
        }
        Ok(())
    }

    /// Replace these settings with a freshly decoded payload
    ///
    /// On error the current values are left untouched.
    pub fn reload(&mut self, payload: &str) -> Result<(), SettingsError> {
        let fresh = Self::from_json(payload)?;
        *self = fresh;
        log::debug!("settings reloaded ({} extra keys)", self.extra.len());
        Ok(())
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.prefixes.is_empty() {
            return Err(SettingsError::invalid(
                "prefixes",
                "must contain at least one prefix",
            ));
        }
        if self.prefixes.iter().any(|p| p.is_empty()) {
            return Err(SettingsError::invalid("prefixes", "prefix cannot be empty"));
        }
        if Duration::try_from_secs_f64(self.reply_delay_threshold).is_err() {
            return Err(SettingsError::invalid(
                "reply_delay_threshold",
                format!(
                    "{} is not a non-negative number of seconds in range",
                    self.reply_delay_threshold
                ),
            ));
        }
        if self.drain_cap == 0 {
            return Err(SettingsError::invalid("drain_cap", "must be at least 1"));
        }
        Ok(())
    }

    // =========================================================================
    // Engine Values
    // =========================================================================

    /// Configured prefixes, in match order
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Replace the prefixes
    pub fn set_prefixes<I, S>(&mut self, prefixes: I) -> Result<(), SettingsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = std::mem::replace(
            &mut self.prefixes,
            prefixes.into_iter().map(Into::into).collect(),
        );
        if let Err(e) = self.validate() {
            self.prefixes = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Return the first configured prefix that `content` starts with
    pub fn match_prefix(&self, content: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| content.starts_with(p.as_str()))
            .map(|p| p.as_str())
    }

    /// Strip the first configured prefix from the start of `name`, if any
    pub fn strip_prefix<'a>(&self, name: &'a str) -> &'a str {
        self.prefixes
            .iter()
            .find_map(|p| name.strip_prefix(p.as_str()))
            .unwrap_or(name)
    }

    /// Whether top-level lookup ignores case
    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Set top-level case-insensitivity
    pub fn set_case_insensitive(&mut self, value: bool) {
        self.case_insensitive = value;
    }

    /// Delay below which replies bypass the scheduled queue
    pub fn reply_delay_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.reply_delay_threshold).unwrap_or(Duration::MAX)
    }

    /// Maximum scheduled entries fired per tick
    pub fn drain_cap(&self) -> usize {
        self.drain_cap
    }

    /// Set the per-tick drain cap
    pub fn set_drain_cap(&mut self, cap: usize) -> Result<(), SettingsError> {
        if cap == 0 {
            return Err(SettingsError::invalid("drain_cap", "must be at least 1"));
        }
        self.drain_cap = cap;
        Ok(())
    }

    /// Default `ignore_extra` for commands that leave it unset
    pub fn ignore_extra_default(&self) -> bool {
        self.ignore_extra_default
    }

    // =========================================================================
    // Free-form Values
    // =========================================================================

    /// Get a raw value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Check whether a free-form key exists
    pub fn contains(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }

    /// Set a free-form value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Get a boolean value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Get an integer value
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Get a float value (integers are widened)
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// Get a string value, reporting why it is unavailable
    pub fn require_str(&self, key: &str) -> Result<&str, SettingsError> {
        let value = self
            .get(key)
            .ok_or_else(|| SettingsError::NotFound(key.to_string()))?;
        value.as_str().ok_or_else(|| SettingsError::TypeMismatch {
            name: key.to_string(),
            expected: "string",
            actual: value_kind(value),
        })
    }

    /// Render a value as qualifier text (strings verbatim, others as JSON)
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Iterate over free-form keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(|k| k.as_str())
    }
}
