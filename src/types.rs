//! Shared data structures for the event detection engine
//!
//! This module defines the types that cross the engine boundary:
//! - Input side: [`Channel`], [`ChannelSample`], [`SampleStatus`]
//! - Output side: [`StepResult`], [`EventStatus`], [`Contribution`], [`ViolationCode`]
//! - Configuration side: [`PredictorKind`], [`DistanceKind`]
//!
//! Upstream ingestion (SCADA connectors, CSV/database readers) and downstream
//! reporting are external collaborators; everything here derives serde so those
//! collaborators can consume engine output without further adaptation.

use serde::{Deserialize, Serialize};

// ============================================================================
// Channels
// ============================================================================

/// A monitored parameter (one sensor signal within a station).
///
/// Channels are created once by the caller and shared with the workflow via
/// `Arc`; the workflow references them but never owns them, since the same
/// channel metadata is typically held by the upstream ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// SCADA point tag, unique within a workflow (e.g. "ST01_CL2")
    pub tag: String,

    /// Human-readable parameter name (e.g. "chlorine residual")
    pub parameter: String,

    /// Minimum meaningful change for this sensor. Used as an adaptive noise
    /// floor: the effective standard deviation never drops below
    /// `precision / outlier_threshold`.
    pub precision: f64,
}

impl Channel {
    /// Create a channel with the default precision (0.0001).
    pub fn new(tag: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            parameter: parameter.into(),
            precision: DEFAULT_PRECISION,
        }
    }

    /// Create a channel with an explicit sensor precision.
    pub fn with_precision(
        tag: impl Into<String>,
        parameter: impl Into<String>,
        precision: f64,
    ) -> Self {
        Self {
            tag: tag.into(),
            parameter: parameter.into(),
            precision,
        }
    }
}

/// Default per-channel precision when the configuration omits it.
pub const DEFAULT_PRECISION: f64 = 0.0001;

// ============================================================================
// Samples
// ============================================================================

/// Quality/status classification attached to a raw sample by upstream
/// ingestion. Anything other than `Normal` marks the sample as suspect;
/// the hard violations additionally force the channel into the contributing
/// set with a [`ViolationCode`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum SampleStatus {
    /// Value is trusted
    #[default]
    Normal,
    /// Value breached a configured control limit (hard alarm)
    OutOfControlLimit,
    /// Value is outside the physically valid range for the sensor
    OutOfValidRange,
    /// Upstream quality screening flagged the value as bad
    FlaggedBadQuality,
    /// No value was received for this index
    Missing,
}

impl SampleStatus {
    /// Hard alarm/quality conditions that mark the channel as alarming for
    /// the step and exclude it from distance comparisons.
    pub fn is_violation(self) -> bool {
        matches!(
            self,
            SampleStatus::OutOfControlLimit
                | SampleStatus::OutOfValidRange
                | SampleStatus::FlaggedBadQuality
        )
    }
}

impl std::fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleStatus::Normal => write!(f, "NORMAL"),
            SampleStatus::OutOfControlLimit => write!(f, "OUT_OF_CONTROL_LIMIT"),
            SampleStatus::OutOfValidRange => write!(f, "OUT_OF_VALID_RANGE"),
            SampleStatus::FlaggedBadQuality => write!(f, "FLAGGED_BAD_QUALITY"),
            SampleStatus::Missing => write!(f, "MISSING"),
        }
    }
}

/// One raw observation for one channel at one time index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChannelSample {
    /// Raw sensor value. NaN is legal and equivalent to `Missing`.
    pub value: f64,

    /// Quality classification from upstream
    pub status: SampleStatus,
}

impl ChannelSample {
    /// A trusted sample.
    pub fn normal(value: f64) -> Self {
        Self {
            value,
            status: SampleStatus::Normal,
        }
    }

    /// A sample that never arrived.
    pub fn missing() -> Self {
        Self {
            value: f64::NAN,
            status: SampleStatus::Missing,
        }
    }

    /// Numerically usable: finite value. A sample can be valid but still
    /// carry a quality violation; the two axes are checked separately.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }

    /// Usable for distance/forecast comparison: finite and not under a hard
    /// quality violation.
    pub fn is_usable(&self) -> bool {
        self.is_valid() && !self.status.is_violation()
    }
}

// ============================================================================
// Event Status
// ============================================================================

/// Per-step verdict of the workflow state machine.
///
/// Exactly one status is active per evaluated step; each step overwrites the
/// previous value, nothing accumulates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum EventStatus {
    /// Warm-up: at least one channel window is not yet full
    #[default]
    Uninitialized,
    /// No usable channel this step (every channel missing, non-finite, or
    /// under a hard quality violation); nothing was evaluated
    DataMissing,
    /// Baseline is normal but at least one channel carries a hard
    /// alarm/quality violation
    ChannelsAlarming,
    /// Sample is consistent with the rolling baseline
    Normal,
    /// Aggregate distance met the outlier threshold this step
    OutlierDetected,
    /// Binomial discriminator probability met the event threshold
    PossibleEvent,
    /// Sustained event: baseline re-seeded from raw history
    EventTimeout,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Uninitialized => write!(f, "UNINITIALIZED"),
            EventStatus::DataMissing => write!(f, "DATA_MISSING"),
            EventStatus::ChannelsAlarming => write!(f, "CHANNELS_ALARMING"),
            EventStatus::Normal => write!(f, "NORMAL"),
            EventStatus::OutlierDetected => write!(f, "OUTLIER_DETECTED"),
            EventStatus::PossibleEvent => write!(f, "POSSIBLE_EVENT"),
            EventStatus::EventTimeout => write!(f, "EVENT_TIMEOUT"),
        }
    }
}

// ============================================================================
// Attribution
// ============================================================================

/// Why a channel is (or is not) considered a likely source of the current
/// outlier/event, reported for operator triage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum Contribution {
    /// Channel residual is within its share of normal variation
    #[default]
    None,
    /// Residual exceeded the threshold in the positive direction
    High,
    /// Residual exceeded the threshold in the negative direction
    Low,
    /// Channel carries a hard quality violation, flagged regardless of its
    /// residual, with the detail in the matching [`ViolationCode`]
    Quality,
}

impl Contribution {
    pub fn is_contributing(self) -> bool {
        !matches!(self, Contribution::None)
    }

    /// Directional code from a residual sign.
    pub fn from_residual(residual: f64) -> Self {
        if residual >= 0.0 {
            Contribution::High
        } else {
            Contribution::Low
        }
    }
}

impl std::fmt::Display for Contribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contribution::None => write!(f, "-"),
            Contribution::High => write!(f, "HIGH"),
            Contribution::Low => write!(f, "LOW"),
            Contribution::Quality => write!(f, "QUALITY"),
        }
    }
}

/// Per-channel quality violation observed this step. Mirrors the hard
/// [`SampleStatus`] conditions; `None` for clean or merely missing channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum ViolationCode {
    #[default]
    None,
    ControlLimit,
    ValidRange,
    BadQuality,
}

impl ViolationCode {
    /// Classify a sample status into a violation code.
    pub fn from_status(status: SampleStatus) -> Self {
        match status {
            SampleStatus::OutOfControlLimit => ViolationCode::ControlLimit,
            SampleStatus::OutOfValidRange => ViolationCode::ValidRange,
            SampleStatus::FlaggedBadQuality => ViolationCode::BadQuality,
            SampleStatus::Normal | SampleStatus::Missing => ViolationCode::None,
        }
    }
}

// ============================================================================
// Step Result
// ============================================================================

/// Everything the engine reports for one evaluated time index.
///
/// Every evaluated index yields a defined result record; per-step data
/// conditions (missing data, numerical degeneracy) are encoded in the fields,
/// never raised as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Time index this result belongs to
    pub index: u64,

    /// State machine verdict for the step
    pub status: EventStatus,

    /// Binomial discriminator probability; NaN when the BED did not run
    /// (warm-up, missing data)
    pub probability: f64,

    /// Per-channel normalized prediction residual, workflow channel order.
    /// NaN for channels that could not be evaluated this step.
    pub residuals: Vec<f64>,

    /// Per-channel attribution codes, workflow channel order
    pub contributing: Vec<Contribution>,

    /// Per-channel quality violations, workflow channel order
    pub violations: Vec<ViolationCode>,
}

impl StepResult {
    /// Tags of channels marked as contributing, for log lines and triage.
    pub fn contributing_tags<'a>(&self, channels: &'a [std::sync::Arc<Channel>]) -> Vec<&'a str> {
        self.contributing
            .iter()
            .zip(channels.iter())
            .filter(|(c, _)| c.is_contributing())
            .map(|(_, ch)| ch.tag.as_str())
            .collect()
    }
}

// ============================================================================
// Predictor Selection
// ============================================================================

/// Distance metric for the nearest-neighbor predictor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DistanceKind {
    /// Sum of absolute differences
    L1,
    /// Euclidean
    #[default]
    L2,
    /// Maximum absolute difference
    Linf,
}

impl std::fmt::Display for DistanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceKind::L1 => write!(f, "L1"),
            DistanceKind::L2 => write!(f, "L2"),
            DistanceKind::Linf => write!(f, "Linf"),
        }
    }
}

/// Which prediction strategy the workflow runs. A tagged variant rather than
/// trait objects: there are exactly two strategies and the engine matches
/// exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PredictorKind {
    /// Multivariate nearest neighbor: distance from the normalized current
    /// observation to the closest normalized historical observation
    NearestNeighbor {
        #[serde(default)]
        distance: DistanceKind,
    },
    /// Per-channel one-step-ahead linear-predictive-coding forecast
    LinearPredictiveForecast,
}

impl Default for PredictorKind {
    fn default() -> Self {
        PredictorKind::NearestNeighbor {
            distance: DistanceKind::default(),
        }
    }
}

impl std::fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictorKind::NearestNeighbor { distance } => write!(f, "MVNN({distance})"),
            PredictorKind::LinearPredictiveForecast => write!(f, "LPCF"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
