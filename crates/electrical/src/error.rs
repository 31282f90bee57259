use std::fmt;

use simcore::IntegratorError;
use thiserror::Error;

/// Malformed cell parameters. Raised while building a model, never at step time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("number of {field} cells must be at least 1")]
    NoCells { field: &'static str },
    #[error("nominal capacity must be positive, got {0} A·s")]
    NonPositiveCapacity(f64),
    #[error("SOC bounds must lie in [0, 1], got soc_min = {soc_min}, soc_max = {soc_max}")]
    SocBoundsOutsideUnitRange { soc_min: f64, soc_max: f64 },
    #[error("soc_max ({soc_max}) must be greater than soc_min ({soc_min})")]
    SocBoundsNotOrdered { soc_min: f64, soc_max: f64 },
    #[error("ocv_min must be positive, got {0} V")]
    NonPositiveOcv(f64),
    #[error("ocv_max ({ocv_max} V) must be greater than ocv_min ({ocv_min} V)")]
    OcvBoundsNotOrdered { ocv_min: f64, ocv_max: f64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("OCV table needs at least 2 points, got {0}")]
    TableTooShort(usize),
    #[error("OCV table starts at SOC {0}, which is below 0")]
    TableStartsBelowZero(f64),
    #[error("OCV table ends at SOC {0}, which is above 1")]
    TableEndsAboveOne(f64),
    #[error("OCV table SOC points must be strictly increasing (point {index}: {soc} after {previous})")]
    TableNotIncreasing { index: usize, previous: f64, soc: f64 },
    #[error("OCV table ratio {ratio} at point {index} is outside [{min_ratio}, 1]")]
    TableRatioOutOfRange { index: usize, ratio: f64, min_ratio: f64 },
    #[error("cannot read parameter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse parameters: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which side of the SOC window was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRangeKind {
    Overcharged,
    Exhausted,
}

impl fmt::Display for OutOfRangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutOfRangeKind::Overcharged => f.write_str("overcharged"),
            OutOfRangeKind::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// State of charge left `[soc_min - ε, soc_max + ε]` after an integration step.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("battery {kind}: SOC {soc:.9} crossed bound {bound} at t = {time:.3} s")]
pub struct OutOfRangeError {
    pub kind: OutOfRangeKind,
    pub soc: f64,
    pub bound: f64,
    pub time: f64,
}

#[derive(Debug, Error)]
pub enum BatteryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),
    #[error("series resistance is {resistance} Ω at {temperature} K; a voltage-driven terminal needs it positive")]
    NonPositiveResistance { resistance: f64, temperature: f64 },
    #[error("terminal excitation must be finite, got {0}")]
    NonFiniteExcitation(f64),
    #[error("state of charge became {soc} at t = {time} s")]
    NonFiniteState { soc: f64, time: f64 },
    #[error(transparent)]
    Integrator(#[from] IntegratorError),
    #[error("host solver failed: {0}")]
    HostSolver(String),
}

impl BatteryError {
    /// The SOC fault carried by this error, if any.
    pub fn out_of_range(&self) -> Option<&OutOfRangeError> {
        match self {
            BatteryError::OutOfRange(fault) => Some(fault),
            _ => None,
        }
    }
}
