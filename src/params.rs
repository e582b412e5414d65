//! FSRS scheduler parameters.
//!
//! All range validation happens at construction time: a parameter set that
//! exists is a valid one, and the algorithm itself never fails at call time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of weights in the FSRS model.
pub const WEIGHT_COUNT: usize = 17;

/// Default weight vector (FSRS 4.5 pre-trained defaults).
pub const DEFAULT_WEIGHTS: [f64; WEIGHT_COUNT] = [
    0.4, 0.6, 2.4, 5.8, 4.93, 0.94, 0.86, 0.01, 1.49, 0.14, 0.94, 2.18, 0.05, 0.34, 1.26, 0.29,
    2.61,
];

/// Forgetting-curve decay exponent.
pub const DECAY: f64 = -0.5;

/// Forgetting-curve factor. Chosen so that with the default retention of
/// 0.9, `retention^(1/DECAY) - 1 == FACTOR` and the next interval equals
/// the stability, rounded.
pub const FACTOR: f64 = 19.0 / 81.0;

/// Stability never drops below this floor (days).
pub const MIN_STABILITY: f64 = 0.1;

const DEFAULT_REQUEST_RETENTION: f64 = 0.9;
const DEFAULT_MAXIMUM_INTERVAL: i64 = 36500;

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("expected {WEIGHT_COUNT} weights, got {0}")]
    WeightCount(usize),

    #[error("request retention must be in (0, 1], got {0}")]
    RequestRetention(f64),

    #[error("maximum interval must be at least 1 day, got {0}")]
    MaximumInterval(i64),
}

/// Immutable per-scheduler configuration.
///
/// Fields are private so the construction-time invariants hold for the
/// lifetime of the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawParameters")]
pub struct FsrsParameters {
    w: [f64; WEIGHT_COUNT],
    request_retention: f64,
    maximum_interval: i64,
    enable_fuzz: bool,
}

impl FsrsParameters {
    pub fn new(
        weights: Vec<f64>,
        request_retention: f64,
        maximum_interval: i64,
        enable_fuzz: bool,
    ) -> Result<Self, ParameterError> {
        let w: [f64; WEIGHT_COUNT] = weights
            .try_into()
            .map_err(|v: Vec<f64>| ParameterError::WeightCount(v.len()))?;

        if !(request_retention > 0.0 && request_retention <= 1.0) {
            return Err(ParameterError::RequestRetention(request_retention));
        }
        if maximum_interval < 1 {
            return Err(ParameterError::MaximumInterval(maximum_interval));
        }

        Ok(Self {
            w,
            request_retention,
            maximum_interval,
            enable_fuzz,
        })
    }

    /// Default parameters with fuzz disabled.
    pub fn with_fuzz(enable_fuzz: bool) -> Self {
        Self {
            enable_fuzz,
            ..Self::default()
        }
    }

    pub fn weights(&self) -> &[f64; WEIGHT_COUNT] {
        &self.w
    }

    /// Weight by index, 0..=16.
    pub fn w(&self, index: usize) -> f64 {
        self.w[index]
    }

    pub fn request_retention(&self) -> f64 {
        self.request_retention
    }

    pub fn maximum_interval(&self) -> i64 {
        self.maximum_interval
    }

    pub fn enable_fuzz(&self) -> bool {
        self.enable_fuzz
    }
}

impl Default for FsrsParameters {
    fn default() -> Self {
        Self {
            w: DEFAULT_WEIGHTS,
            request_retention: DEFAULT_REQUEST_RETENTION,
            maximum_interval: DEFAULT_MAXIMUM_INTERVAL,
            enable_fuzz: false,
        }
    }
}

/// Deserialization goes through `new` so persisted configs get the same
/// validation as programmatic ones.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameters {
    w: Vec<f64>,
    #[serde(default = "default_retention")]
    request_retention: f64,
    #[serde(default = "default_maximum_interval")]
    maximum_interval: i64,
    #[serde(default)]
    enable_fuzz: bool,
}

fn default_retention() -> f64 {
    DEFAULT_REQUEST_RETENTION
}

fn default_maximum_interval() -> i64 {
    DEFAULT_MAXIMUM_INTERVAL
}

impl TryFrom<RawParameters> for FsrsParameters {
    type Error = ParameterError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        Self::new(
            raw.w,
            raw.request_retention,
            raw.maximum_interval,
            raw.enable_fuzz,
        )
    }
}
