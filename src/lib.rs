//! Aquasentry: Online Event Detection for Process-Sensor Streams
//!
//! Detects anomalous events in multivariate sensor time series (water-quality
//! SCADA streams and similar) by comparing each new sample against a rolling
//! statistical model of recent normal behavior, then applying a binomial
//! discriminator to separate transient outliers from sustained events.
//!
//! ## Architecture
//!
//! - **Workflow engine**: per-station state machine driving windows,
//!   prediction, event discrimination, and recovery
//! - **Predictors**: multivariate nearest-neighbor distance (MVNN) and
//!   linear-predictive-coding forecast (LPCF)
//! - **Binomial Event Discriminator**: converts binary outlier flags into an
//!   event probability
//! - **Rolling windows**: fixed-capacity per-channel baselines with
//!   NaN-ignoring statistics
//!
//! Evaluation is synchronous: one [`Workflow::step`] call evaluates one time
//! index and fully updates internal state before returning. Ingestion
//! connectors, schedulers, and reporting front ends are external
//! collaborators that feed samples in and consume [`StepResult`] records.

pub mod bed;
pub mod config;
pub mod engine;
pub mod predictors;
pub mod signal;
pub mod types;
pub mod window;

// Re-export configuration
pub use config::{ChannelEntry, ConfigError, DetectorConfig, StationConfig, StationInfo};

// Re-export commonly used types
pub use types::{
    Channel, ChannelSample, Contribution, DistanceKind, EventStatus, PredictorKind, SampleStatus,
    StepResult, ViolationCode,
};

// Re-export the engine
pub use engine::{Workflow, WorkflowError, WorkflowState};

// Re-export detection components
pub use bed::BinomialEventDiscriminator;
pub use predictors::{LpcForecastPredictor, NearestNeighborPredictor, Predictor};
pub use window::{RollingWindow, WindowError};
