//! Cell-stack parameter record, presets and validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simcore::IntegrationScheme;

use crate::error::ConfigurationError;

/// Slack allowed when comparing table ratios against `[ocv_min/ocv_max, 1]`.
const RATIO_SLACK: f64 = 1e-9;

/// Interpolation used between OCV table points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothness {
    /// Piecewise linear; continuous value, discontinuous slope.
    #[default]
    Linear,
    /// Piecewise cubic Hermite with Fritsch-Carlson slopes; continuous slope,
    /// never overshoots between points.
    MonotoneCubic,
}

/// Which OCV table feeds the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcvSource {
    /// The empirical `ocv_table`.
    #[default]
    Table,
    /// Straight line from `(soc_min, ocv_min/ocv_max)` to `(soc_max, 1)`.
    Linear,
}

/// What to do when SOC leaves its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundPolicy {
    /// Return the fault and refuse further integration.
    #[default]
    Fatal,
    /// Log the fault, record it and keep integrating.
    Warn,
}

fn default_t_ref() -> f64 {
    298.15
}

fn default_soc_tolerance() -> f64 {
    1e-9
}

/// Parameters of a stack of `ns` series by `np` parallel identical cells.
///
/// Voltages, currents and resistances are per cell; the model scales them to
/// the stack. Currents are positive when discharging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellParameters {
    /// Cells in series.
    pub ns: u32,
    /// Cells in parallel.
    pub np: u32,
    /// Nominal cell capacity (A·s).
    pub qnom: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    /// Cell open-circuit voltage at `soc_min` (V).
    pub ocv_min: f64,
    /// Cell open-circuit voltage at `soc_max` (V).
    pub ocv_max: f64,
    /// Cell self-discharge current at `ocv_max` (A). Zero removes the branch.
    #[serde(default)]
    pub idis: f64,
    /// Cell series resistance at `t_ref` (Ω).
    pub r0: f64,
    /// Reference temperature for `r0` (K).
    #[serde(default = "default_t_ref")]
    pub t_ref: f64,
    /// Linear temperature coefficient of `r0` (1/K).
    #[serde(default)]
    pub alpha: f64,
    /// `(soc, ocv/ocv_max)` pairs, strictly increasing in SOC.
    #[serde(default)]
    pub ocv_table: Vec<(f64, f64)>,
    #[serde(default)]
    pub smoothness: Smoothness,
    #[serde(default)]
    pub ocv_source: OcvSource,
    /// Tolerance ε on the SOC window check.
    #[serde(default = "default_soc_tolerance")]
    pub soc_tolerance: f64,
    #[serde(default)]
    pub bound_policy: BoundPolicy,
    #[serde(default)]
    pub integration: IntegrationScheme,
}

impl CellParameters {
    /// Single cell with a linear OCV from 3.0 V to 4.2 V, 1 Ah, 0.1 Ω.
    pub fn linear_reference() -> Self {
        CellParameters {
            ns: 1,
            np: 1,
            qnom: 3600.0,
            soc_min: 0.0,
            soc_max: 1.0,
            ocv_min: 3.0,
            ocv_max: 4.2,
            idis: 0.0,
            r0: 0.1,
            t_ref: default_t_ref(),
            alpha: 0.0,
            ocv_table: Vec::new(),
            smoothness: Smoothness::Linear,
            ocv_source: OcvSource::Linear,
            soc_tolerance: default_soc_tolerance(),
            bound_policy: BoundPolicy::Fatal,
            integration: IntegrationScheme::ExplicitEuler,
        }
    }

    /// Generic 2.5 Ah lithium-ion 18650 cell with a smooth empirical OCV curve.
    pub fn lithium_ion_18650() -> Self {
        const OCV_MIN: f64 = 2.5;
        const OCV_MAX: f64 = 4.2;
        CellParameters {
            ns: 1,
            np: 1,
            qnom: 2.5 * 3600.0,
            soc_min: 0.0,
            soc_max: 1.0,
            ocv_min: OCV_MIN,
            ocv_max: OCV_MAX,
            idis: 1e-5,
            r0: 0.03,
            t_ref: default_t_ref(),
            alpha: 0.004,
            ocv_table: vec![
                (0.00, OCV_MIN / OCV_MAX),
                (0.05, 3.20 / OCV_MAX),
                (0.10, 3.40 / OCV_MAX),
                (0.20, 3.55 / OCV_MAX),
                (0.40, 3.70 / OCV_MAX),
                (0.60, 3.85 / OCV_MAX),
                (0.80, 4.00 / OCV_MAX),
                (1.00, 1.0),
            ],
            smoothness: Smoothness::MonotoneCubic,
            ocv_source: OcvSource::Table,
            soc_tolerance: default_soc_tolerance(),
            bound_policy: BoundPolicy::Fatal,
            integration: IntegrationScheme::ExplicitEuler,
        }
    }

    /// Parses and validates parameters from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigurationError> {
        let params: CellParameters = serde_json::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Table actually used by the OCV curve, after applying `ocv_source`.
    pub fn effective_ocv_table(&self) -> Vec<(f64, f64)> {
        match self.ocv_source {
            OcvSource::Table => self.ocv_table.clone(),
            OcvSource::Linear => vec![(self.soc_min, self.ocv_min / self.ocv_max), (self.soc_max, 1.0)],
        }
    }

    /// Stack open-circuit voltage at full charge (V).
    pub fn stack_ocv_max(&self) -> f64 {
        f64::from(self.ns) * self.ocv_max
    }

    /// Stack capacity (A·s).
    pub fn stack_capacity(&self) -> f64 {
        f64::from(self.np) * self.qnom
    }

    /// Stack series resistance at `t_ref` (Ω).
    pub fn stack_resistance(&self) -> f64 {
        f64::from(self.ns) * self.r0 / f64::from(self.np)
    }

    /// Self-discharge conductance of the stack (S).
    pub fn self_discharge_conductance(&self) -> f64 {
        f64::from(self.np) * self.idis / self.stack_ocv_max()
    }

    /// Checks every invariant, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let scalars = [
            ("qnom", self.qnom),
            ("soc_min", self.soc_min),
            ("soc_max", self.soc_max),
            ("ocv_min", self.ocv_min),
            ("ocv_max", self.ocv_max),
            ("idis", self.idis),
            ("r0", self.r0),
            ("t_ref", self.t_ref),
            ("alpha", self.alpha),
            ("soc_tolerance", self.soc_tolerance),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ConfigurationError::NotFinite { field, value });
            }
        }

        if self.ns == 0 {
            return Err(ConfigurationError::NoCells { field: "series" });
        }
        if self.np == 0 {
            return Err(ConfigurationError::NoCells { field: "parallel" });
        }
        if self.qnom <= 0.0 {
            return Err(ConfigurationError::NonPositiveCapacity(self.qnom));
        }

        if !(0.0..=1.0).contains(&self.soc_min) || !(0.0..=1.0).contains(&self.soc_max) {
            return Err(ConfigurationError::SocBoundsOutsideUnitRange {
                soc_min: self.soc_min,
                soc_max: self.soc_max,
            });
        }
        if self.soc_max <= self.soc_min {
            return Err(ConfigurationError::SocBoundsNotOrdered {
                soc_min: self.soc_min,
                soc_max: self.soc_max,
            });
        }

        if self.ocv_min <= 0.0 {
            return Err(ConfigurationError::NonPositiveOcv(self.ocv_min));
        }
        if self.ocv_max <= self.ocv_min {
            return Err(ConfigurationError::OcvBoundsNotOrdered {
                ocv_min: self.ocv_min,
                ocv_max: self.ocv_max,
            });
        }

        for (field, value) in [("idis", self.idis), ("r0", self.r0), ("soc_tolerance", self.soc_tolerance)] {
            if value < 0.0 {
                return Err(ConfigurationError::Negative { field, value });
            }
        }

        self.validate_table(&self.effective_ocv_table())
    }

    fn validate_table(&self, table: &[(f64, f64)]) -> Result<(), ConfigurationError> {
        if table.len() < 2 {
            return Err(ConfigurationError::TableTooShort(table.len()));
        }
        for &(soc, ratio) in table {
            if !soc.is_finite() {
                return Err(ConfigurationError::NotFinite { field: "ocv_table soc", value: soc });
            }
            if !ratio.is_finite() {
                return Err(ConfigurationError::NotFinite { field: "ocv_table ratio", value: ratio });
            }
        }

        let first = table[0].0;
        if first < 0.0 {
            return Err(ConfigurationError::TableStartsBelowZero(first));
        }
        let last = table[table.len() - 1].0;
        if last > 1.0 {
            return Err(ConfigurationError::TableEndsAboveOne(last));
        }

        for (index, pair) in table.windows(2).enumerate() {
            let (previous, soc) = (pair[0].0, pair[1].0);
            if soc <= previous {
                return Err(ConfigurationError::TableNotIncreasing {
                    index: index + 1,
                    previous,
                    soc,
                });
            }
        }

        let min_ratio = self.ocv_min / self.ocv_max;
        for (index, &(_, ratio)) in table.iter().enumerate() {
            if ratio < min_ratio - RATIO_SLACK || ratio > 1.0 + RATIO_SLACK {
                return Err(ConfigurationError::TableRatioOutOfRange { index, ratio, min_ratio });
            }
        }

        Ok(())
    }
}

impl Default for CellParameters {
    fn default() -> Self {
        CellParameters::lithium_ion_18650()
    }
}
