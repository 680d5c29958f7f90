//! Matcher configuration.
//!
//! Every value has a default, so an empty TOML document is a valid
//! configuration. Tables that map names to numbers (`engine_weights`,
//! `method_bonuses`) are merged over the defaults rather than replacing them.
//!
//! ```toml
//! tenant = "acme"
//!
//! [engine_weights]
//! recurring_pattern = 0.7
//!
//! [execution]
//! engine_timeout_ms = 250
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Weight used for engines missing from `engine_weights`
pub const DEFAULT_ENGINE_WEIGHT: f64 = 0.5;

/// Default ensemble weights per engine name
pub const DEFAULT_ENGINE_WEIGHTS: &[(&str, f64)] = &[
    ("id_priority", 0.90),
    ("license_plate", 0.80),
    ("loan_disbursement", 0.88),
    ("mongolian_name", 0.70),
    ("phone_priority", 0.85),
    ("recurring_pattern", 0.75),
];

/// Default bonus points per method tag. Tags without an entry get no bonus.
pub const DEFAULT_METHOD_BONUSES: &[(&str, f64)] = &[
    ("exact_phone_match", 10.0),
    ("exact_id_match", 12.0),
    ("combined_signals", 8.0),
    ("license_plate_exact", 5.0),
    ("loan_disbursement_pattern", 7.0),
    ("recurring_pattern_exact", 8.0),
    ("recurring_pattern_partial", 3.0),
    ("partial_phone_match", 2.0),
    ("partial_id_match", 4.0),
    ("name_similarity", 1.0),
    ("amount_similarity", 2.0),
];

/// Upper bound on results returned by one suggestion request
pub const MAX_RESULTS_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Feedback calibration thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Feedback entries for one method before it is calibrated on its own
    pub min_method_samples: usize,
    /// Engine-wide feedback entries used when a method has too few
    pub min_engine_samples: usize,
    /// Feedback entries before a weight change is proposed
    pub min_weight_samples: usize,
    /// Multiplier turning an accuracy gap into confidence points
    pub adjustment_scale: f64,
    /// Cap on the per-engine confidence history and feedback log
    pub history_cap: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_method_samples: 5,
            min_engine_samples: 3,
            min_weight_samples: 10,
            adjustment_scale: 20.0,
            history_cap: 1000,
        }
    }
}

/// Data-quality factor terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub missing_field_penalty: f64,
    pub present_field_bonus: f64,
    pub exact_method_bonus: f64,
    pub partial_method_bonus: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            missing_field_penalty: 0.1,
            present_field_bonus: 0.05,
            exact_method_bonus: 0.1,
            partial_method_bonus: 0.05,
            min_factor: 0.7,
            max_factor: 1.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// Lifetime of a response with timed-out engines. Such responses are
    /// kept for feedback and details lookups but never served as a hit.
    pub best_effort_ttl_secs: u64,
    pub max_entries: usize,
    /// Oldest entries removed at once when `max_entries` is exceeded
    pub evict_batch: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            best_effort_ttl_secs: 120,
            max_entries: 1000,
            evict_batch: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Per-engine deadline within one request
    pub engine_timeout_ms: u64,
    /// Deadline for the whole ensemble
    pub request_deadline_ms: u64,
    pub max_results: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            engine_timeout_ms: 300,
            request_deadline_ms: 1500,
            max_results: MAX_RESULTS_LIMIT,
        }
    }
}

/// Top-level matcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub tenant: String,
    pub engine_weights: BTreeMap<String, f64>,
    pub method_bonuses: BTreeMap<String, f64>,
    pub quality: QualitySettings,
    pub calibration: CalibrationSettings,
    pub cache: CacheSettings,
    pub execution: ExecutionSettings,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            engine_weights: default_table(DEFAULT_ENGINE_WEIGHTS),
            method_bonuses: default_table(DEFAULT_METHOD_BONUSES),
            quality: QualitySettings::default(),
            calibration: CalibrationSettings::default(),
            cache: CacheSettings::default(),
            execution: ExecutionSettings::default(),
        }
    }
}

fn default_table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(name, value)| ((*name).to_string(), *value))
        .collect()
}

impl MatcherConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string, merge the name tables over the
    /// defaults and validate the result
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;

        for (name, weight) in DEFAULT_ENGINE_WEIGHTS {
            config
                .engine_weights
                .entry((*name).to_string())
                .or_insert(*weight);
        }
        for (tag, bonus) in DEFAULT_METHOD_BONUSES {
            config
                .method_bonuses
                .entry((*tag).to_string())
                .or_insert(*bonus);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in &self.engine_weights {
            if !is_valid_weight(*weight) {
                return Err(ConfigError::Invalid(format!(
                    "engine weight for '{name}' must be in (0, 1], got {weight}"
                )));
            }
        }
        if self.quality.min_factor <= 0.0 || self.quality.min_factor > self.quality.max_factor {
            return Err(ConfigError::Invalid(
                "quality factor bounds must satisfy 0 < min_factor <= max_factor".to_string(),
            ));
        }
        if self.cache.max_entries == 0 || self.cache.evict_batch == 0 {
            return Err(ConfigError::Invalid(
                "cache max_entries and evict_batch must be positive".to_string(),
            ));
        }
        if self.execution.engine_timeout_ms == 0 || self.execution.request_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution timeouts must be positive".to_string(),
            ));
        }
        if self.execution.max_results == 0 || self.execution.max_results > MAX_RESULTS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Engine weights live in (0, 1]
#[must_use]
pub fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0 && weight <= 1.0
}
