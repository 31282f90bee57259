//! Open-circuit voltage as a function of state of charge.

use crate::error::ConfigurationError;
use crate::params::{CellParameters, Smoothness};

/// Table-driven OCV curve, normalized to `ocv_max`.
///
/// Outside the table domain the nearest endpoint value is held; the curve is
/// never extended past the table.
#[derive(Debug, Clone)]
pub struct OpenCircuitVoltageCurve {
    socs: Vec<f64>,
    ratios: Vec<f64>,
    /// Hermite tangents, empty for linear interpolation.
    slopes: Vec<f64>,
    stack_ocv_max: f64,
}

impl OpenCircuitVoltageCurve {
    /// Builds the curve selected by `params.ocv_source`, validating `params` first.
    pub fn from_params(params: &CellParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let table = params.effective_ocv_table();
        let socs: Vec<f64> = table.iter().map(|&(soc, _)| soc).collect();
        let ratios: Vec<f64> = table.iter().map(|&(_, ratio)| ratio).collect();
        let slopes = match params.smoothness {
            Smoothness::Linear => Vec::new(),
            Smoothness::MonotoneCubic => monotone_slopes(&socs, &ratios),
        };
        Ok(OpenCircuitVoltageCurve {
            socs,
            ratios,
            slopes,
            stack_ocv_max: params.stack_ocv_max(),
        })
    }

    /// SOC range covered by the table.
    pub fn domain(&self) -> (f64, f64) {
        (self.socs[0], self.socs[self.socs.len() - 1])
    }

    /// Normalized open-circuit voltage `ocv / ocv_max` at `soc`.
    pub fn ratio(&self, soc: f64) -> f64 {
        if soc.is_nan() {
            return f64::NAN;
        }
        let last = self.socs.len() - 1;
        if soc <= self.socs[0] {
            return self.ratios[0];
        }
        if soc >= self.socs[last] {
            return self.ratios[last];
        }

        // first index whose SOC is above `soc`, always in 1..=last here
        let upper = self.socs.partition_point(|&x| x <= soc);
        let k = upper - 1;
        let h = self.socs[k + 1] - self.socs[k];
        let t = (soc - self.socs[k]) / h;
        let (y0, y1) = (self.ratios[k], self.ratios[k + 1]);

        if self.slopes.is_empty() {
            return y0 + t * (y1 - y0);
        }

        let t2 = t * t;
        let t3 = t2 * t;

        // Hermite basis
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * y0 + h10 * h * self.slopes[k] + h01 * y1 + h11 * h * self.slopes[k + 1]
    }

    /// Stack open-circuit voltage (V) at `soc`.
    pub fn voltage(&self, soc: f64) -> f64 {
        self.stack_ocv_max * self.ratio(soc)
    }
}

/// Fritsch-Carlson tangents: zero at local extrema, weighted harmonic mean of
/// the neighbouring secants elsewhere, one-sided secants at the ends.
fn monotone_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = y.windows(2).zip(&h).map(|(w, h)| (w[1] - w[0]) / h).collect();

    let mut m = vec![0.0; n];
    m[0] = delta[0];
    m[n - 1] = delta[n - 2];
    for k in 1..n - 1 {
        let (d0, d1) = (delta[k - 1], delta[k]);
        if d0 * d1 <= 0.0 {
            m[k] = 0.0;
        } else {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            m[k] = (w1 + w2) / (w1 / d0 + w2 / d1);
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OcvSource;
    use approx::assert_relative_eq;

    fn curve(smoothness: Smoothness) -> (CellParameters, OpenCircuitVoltageCurve) {
        let mut params = CellParameters::lithium_ion_18650();
        params.smoothness = smoothness;
        let curve = OpenCircuitVoltageCurve::from_params(&params).unwrap();
        (params, curve)
    }

    #[test]
    fn exact_at_control_points() {
        for smoothness in [Smoothness::Linear, Smoothness::MonotoneCubic] {
            let (params, curve) = curve(smoothness);
            for &(soc, ratio) in &params.ocv_table {
                assert_eq!(curve.ratio(soc), ratio, "{smoothness:?} at soc {soc}");
            }
        }
    }

    #[test]
    fn table_loaded_from_json_is_exact_at_control_points() {
        let preset = CellParameters::lithium_ion_18650();
        let json = serde_json::to_string(&preset).unwrap();
        for smoothness in [Smoothness::Linear, Smoothness::MonotoneCubic] {
            let mut loaded = CellParameters::from_json_str(&json).unwrap();
            loaded.smoothness = smoothness;
            let curve = OpenCircuitVoltageCurve::from_params(&loaded).unwrap();
            for &(soc, ratio) in &preset.ocv_table {
                assert_eq!(curve.ratio(soc), ratio, "{smoothness:?} at soc {soc}");
            }
        }
    }

    #[test]
    fn holds_last_point_outside_the_domain() {
        let mut params = CellParameters::lithium_ion_18650();
        params.ocv_table = vec![(0.1, 0.7), (0.5, 0.85), (0.9, 0.98)];
        params.smoothness = Smoothness::MonotoneCubic;
        let curve = OpenCircuitVoltageCurve::from_params(&params).unwrap();

        assert_eq!(curve.domain(), (0.1, 0.9));
        assert_eq!(curve.ratio(0.0), 0.7);
        assert_eq!(curve.ratio(-3.0), 0.7);
        assert_eq!(curve.ratio(0.95), 0.98);
        assert_eq!(curve.ratio(1.0), 0.98);
        assert_eq!(curve.ratio(7.0), 0.98);
    }

    #[test]
    fn linear_interpolates_between_points() {
        let (_, curve) = curve(Smoothness::Linear);
        let expected = (3.55 + 0.5 * (3.70 - 3.55)) / 4.2;
        assert_relative_eq!(curve.ratio(0.3), expected, epsilon = 1e-12);
    }

    #[test]
    fn monotone_cubic_never_overshoots() {
        let (params, curve) = curve(Smoothness::MonotoneCubic);
        let mut previous = curve.ratio(0.0);
        for i in 1..=1000 {
            let soc = i as f64 / 1000.0;
            let ratio = curve.ratio(soc);
            assert!(ratio >= previous - 1e-12, "not monotone at {soc}");
            previous = ratio;
        }
        let min_ratio = params.ocv_min / params.ocv_max;
        assert!(curve.ratio(0.01) >= min_ratio);
        assert!(curve.ratio(0.99) <= 1.0);
    }

    #[test]
    fn flat_segment_stays_flat() {
        let mut params = CellParameters::linear_reference();
        params.ocv_source = OcvSource::Table;
        params.smoothness = Smoothness::MonotoneCubic;
        params.ocv_table = vec![(0.0, 0.8), (0.3, 0.9), (0.7, 0.9), (1.0, 1.0)];
        let curve = OpenCircuitVoltageCurve::from_params(&params).unwrap();
        for i in 0..=10 {
            let soc = 0.3 + 0.04 * i as f64;
            assert_relative_eq!(curve.ratio(soc), 0.9, epsilon = 1e-12);
        }
    }

    #[test]
    fn linear_source_scales_to_stack_voltage() {
        let mut params = CellParameters::linear_reference();
        params.ns = 3;
        let curve = OpenCircuitVoltageCurve::from_params(&params).unwrap();
        assert_relative_eq!(curve.voltage(1.0), 12.6, epsilon = 1e-12);
        assert_relative_eq!(curve.voltage(0.0), 9.0, epsilon = 1e-12);
        assert_relative_eq!(curve.voltage(0.5), 10.8, epsilon = 1e-12);
    }

    #[test]
    fn invalid_parameters_fail_at_construction() {
        let mut params = CellParameters::lithium_ion_18650();
        params.ocv_table[0].0 = -0.2;
        assert!(matches!(
            OpenCircuitVoltageCurve::from_params(&params),
            Err(ConfigurationError::TableStartsBelowZero(_))
        ));
    }

    #[test]
    fn nan_propagates() {
        let (_, curve) = curve(Smoothness::Linear);
        assert!(curve.ratio(f64::NAN).is_nan());
    }
}
