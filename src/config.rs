//! Detector configuration - typed, eagerly validated, TOML-loadable
//!
//! The engine core accepts only the typed [`DetectorConfig`]; parsing a
//! configuration file is the explicit external step that produces one.
//! Validation is fatal and happens before any evaluation: a workflow must
//! refuse to initialize on a malformed configuration rather than misbehave
//! at step time.
//!
//! File loading follows the standard search order:
//! 1. `$AQUASENTRY_CONFIG` env var
//! 2. `./detector_config.toml`
//! 3. Built-in defaults (no channels; callers add those programmatically)

use crate::types::{PredictorKind, DEFAULT_PRECISION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Errors
// ============================================================================

/// Fatal configuration problems, raised before any evaluation occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("bed_outlier_probability must lie strictly inside (0, 1), got {0}")]
    ProbabilityOutOfRange(f64),

    #[error("channel '{0}': precision must be positive")]
    NonPositivePrecision(String),

    #[error("duplicate channel tag '{0}'")]
    DuplicateChannel(String),

    #[error("a workflow requires at least one channel")]
    NoChannels,
}

// ============================================================================
// Detector Parameters
// ============================================================================

/// All tunable parameters of the per-workflow detection engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Number of most-recent accepted samples each channel's baseline
    /// window retains
    #[serde(default = "defaults::history_window_size")]
    pub history_window_size: u32,

    /// Aggregate-distance threshold at which a step counts as an outlier
    #[serde(default = "defaults::outlier_threshold")]
    pub outlier_threshold: f64,

    /// Binomial probability at which outliers are promoted to a possible
    /// event
    #[serde(default = "defaults::event_threshold")]
    pub event_threshold: f64,

    /// Consecutive possible-event steps before the baseline is re-seeded
    #[serde(default = "defaults::event_timeout_steps")]
    pub event_timeout_steps: u32,

    /// Length of the binary outlier-flag window
    #[serde(default = "defaults::bed_window_size")]
    pub bed_window_size: u32,

    /// Prior outlier probability under the null hypothesis
    #[serde(default = "defaults::bed_outlier_probability")]
    pub bed_outlier_probability: f64,

    /// Prediction strategy
    #[serde(default)]
    pub predictor: PredictorKind,
}

mod defaults {
    pub fn history_window_size() -> u32 {
        20
    }
    pub fn outlier_threshold() -> f64 {
        0.8
    }
    pub fn event_threshold() -> f64 {
        0.85
    }
    pub fn event_timeout_steps() -> u32 {
        12
    }
    pub fn bed_window_size() -> u32 {
        6
    }
    pub fn bed_outlier_probability() -> f64 {
        crate::bed::DEFAULT_OUTLIER_PROBABILITY
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            history_window_size: defaults::history_window_size(),
            outlier_threshold: defaults::outlier_threshold(),
            event_threshold: defaults::event_threshold(),
            event_timeout_steps: defaults::event_timeout_steps(),
            bed_window_size: defaults::bed_window_size(),
            bed_outlier_probability: defaults::bed_outlier_probability(),
            predictor: PredictorKind::default(),
        }
    }
}

impl DetectorConfig {
    /// Range-check every parameter. Called by the workflow constructor;
    /// failure is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_window_size == 0 {
            return Err(ConfigError::NonPositive {
                field: "history_window_size",
                value: 0.0,
            });
        }
        if !(self.outlier_threshold > 0.0) || !self.outlier_threshold.is_finite() {
            return Err(ConfigError::NonPositive {
                field: "outlier_threshold",
                value: self.outlier_threshold,
            });
        }
        if !(self.event_threshold > 0.0) || !self.event_threshold.is_finite() {
            return Err(ConfigError::NonPositive {
                field: "event_threshold",
                value: self.event_threshold,
            });
        }
        if self.event_timeout_steps == 0 {
            return Err(ConfigError::NonPositive {
                field: "event_timeout_steps",
                value: 0.0,
            });
        }
        if self.bed_window_size == 0 {
            return Err(ConfigError::NonPositive {
                field: "bed_window_size",
                value: 0.0,
            });
        }
        if !(self.bed_outlier_probability > 0.0 && self.bed_outlier_probability < 1.0) {
            return Err(ConfigError::ProbabilityOutOfRange(
                self.bed_outlier_probability,
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Station File Config
// ============================================================================

/// One monitored channel as declared in a station file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelEntry {
    /// SCADA point tag, unique within the station
    pub tag: String,

    /// Human-readable parameter name
    #[serde(default)]
    pub parameter: String,

    /// Minimum meaningful change for the sensor
    #[serde(default = "default_precision")]
    pub precision: f64,
}

fn default_precision() -> f64 {
    DEFAULT_PRECISION
}

/// Station identification block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StationInfo {
    /// Station name for log lines and reports
    #[serde(default)]
    pub name: String,
}

/// Root of a station configuration file: identification, detector tuning,
/// and the monitored channel list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StationConfig {
    #[serde(default)]
    pub station: StationInfo,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

impl StationConfig {
    /// Load using the standard search order:
    /// 1. `$AQUASENTRY_CONFIG` environment variable
    /// 2. `./detector_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("AQUASENTRY_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), station = %config.station.name, "Loaded station config from AQUASENTRY_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from AQUASENTRY_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "AQUASENTRY_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("detector_config.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(station = %config.station.name, "Loaded station config from ./detector_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./detector_config.toml, using defaults");
                }
            }
        }

        info!("No detector_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path. Parse and range errors are fatal.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check the detector block and every channel entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        let mut seen = std::collections::HashSet::new();
        for entry in &self.channels {
            if !(entry.precision > 0.0) || !entry.precision.is_finite() {
                return Err(ConfigError::NonPositivePrecision(entry.tag.clone()));
            }
            if !seen.insert(entry.tag.as_str()) {
                return Err(ConfigError::DuplicateChannel(entry.tag.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
