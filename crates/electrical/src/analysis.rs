//! Battery analysis functions for sizing and design studies
//!
//! These run the full cell model in Rust and return column data suitable for
//! plotting or CSV export.

use simcore::{FixedTimestep, IntegratorError};

use crate::cell::BatteryCellModel;
use crate::circuit::Excitation;
use crate::error::{BatteryError, ConfigurationError, OutOfRangeError};
use crate::params::CellParameters;
use crate::thermal::ThermalLossAggregator;

/// Upper bound on rows reserved up front; longer runs grow the columns as they go.
const MAX_RESERVED_ROWS: usize = 1 << 20;

/// Result of battery discharge analysis
#[derive(Debug, Clone, Default)]
pub struct DischargeResult {
    pub times: Vec<f64>,
    pub voltages: Vec<f64>,
    pub soc: Vec<f64>,
    pub power: Vec<f64>,
    pub heat_flow: Vec<f64>,
    /// Set when the run ended because SOC left its window.
    pub fault: Option<OutOfRangeError>,
}

impl DischargeResult {
    fn with_capacity(n: usize) -> Self {
        DischargeResult {
            times: Vec::with_capacity(n),
            voltages: Vec::with_capacity(n),
            soc: Vec::with_capacity(n),
            power: Vec::with_capacity(n),
            heat_flow: Vec::with_capacity(n),
            fault: None,
        }
    }

    fn push(&mut self, time: f64, voltage: f64, soc: f64, power: f64, heat_flow: f64) {
        self.times.push(time);
        self.voltages.push(voltage);
        self.soc.push(soc);
        self.power.push(power);
        self.heat_flow.push(heat_flow);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Energy delivered to the load (Wh), rectangle rule over recorded steps.
    pub fn delivered_energy_wh(&self) -> f64 {
        self.times
            .windows(2)
            .zip(self.power.iter().skip(1))
            .map(|(t, p)| p * (t[1] - t[0]))
            .sum::<f64>()
            / 3600.0
    }
}

/// Analyze battery discharge over time at constant current
///
/// Records the open-circuit operating point at t = 0 and then one row per
/// step. The first SOC fault ends the run under either bound policy and is
/// stored in the result; the step that raised it is not recorded. Any other
/// error is returned.
///
/// # Arguments
/// * `params` - Cell stack parameters
/// * `current` - Constant discharge current (A)
/// * `duration_s` - Total simulation time (seconds)
/// * `dt` - Time step (seconds)
pub fn simulate_battery_discharge(
    params: &CellParameters,
    current: f64,
    duration_s: f64,
    dt: f64,
) -> Result<DischargeResult, BatteryError> {
    let mut model = BatteryCellModel::new(params.clone())?;
    let mut driver = FixedTimestep::new(dt)?;
    let excitation = Excitation::Current(current);

    if !(duration_s.is_finite() && duration_s >= 0.0) {
        return Err(IntegratorError::InvalidInterval(duration_s).into());
    }

    let n_steps = (duration_s / dt).ceil().min(MAX_RESERVED_ROWS as f64) as usize;
    let mut result = DischargeResult::with_capacity(n_steps.saturating_add(1));

    let initial = model.operating_point(excitation)?;
    let initial_heat =
        ThermalLossAggregator::losses(model.circuit(), model.soc(), current, model.temperature()).total();
    result.push(0.0, initial.voltage, model.soc(), initial.power(), initial_heat);

    let outcome = driver.advance(duration_s, |ctx| {
        let out = model.step(ctx, excitation)?;
        if let Some(&fault) = model.fault() {
            return Err(BatteryError::OutOfRange(fault));
        }
        result.push(out.time, out.terminal.voltage, out.soc, out.power(), out.heat_flow);
        Ok::<(), BatteryError>(())
    });

    match outcome {
        Ok(_) => {}
        Err(BatteryError::OutOfRange(fault)) => result.fault = Some(fault),
        Err(other) => return Err(other),
    }

    log::debug!(
        "discharge at {current} A: {} rows, final soc {:.4}, fault {:?}",
        result.len(),
        result.soc.last().copied().unwrap_or(f64::NAN),
        result.fault.map(|f| f.kind)
    );
    Ok(result)
}

/// Calculate minimum voltage under load (voltage sag)
///
/// Samples the SOC window at the reference temperature.
/// Returns (min_voltage, soc_at_min_voltage)
pub fn voltage_sag_analysis(params: &CellParameters, peak_current: f64) -> Result<(f64, f64), ConfigurationError> {
    let model = BatteryCellModel::new(params.clone())?;
    let circuit = model.circuit();
    let window = model.soc_window();

    // fractions of the SOC window, densest near empty where the curve drops
    let fractions = [1.0, 0.8, 0.6, 0.4, 0.2, 0.1, 0.05];
    let mut min_voltage = f64::MAX;
    let mut soc_at_min = window.max;

    for fraction in fractions {
        let soc = window.min + fraction * (window.max - window.min);
        let voltage = circuit.terminal_voltage(soc, peak_current, params.t_ref);

        if voltage < min_voltage {
            min_voltage = voltage;
            soc_at_min = soc;
        }
    }

    Ok((min_voltage, soc_at_min))
}

/// Energy (Wh) delivered at a constant discharge current until the stack is
/// exhausted, whatever the configured bound policy.
pub fn usable_energy_wh(params: &CellParameters, current: f64, dt: f64) -> Result<f64, BatteryError> {
    if !(current.is_finite() && current > 0.0) {
        return Err(ConfigurationError::NonPositive { field: "current", value: current }.into());
    }
    // twice the nominal discharge time always reaches the lower bound
    let duration = 2.0 * params.stack_capacity() / current;
    let result = simulate_battery_discharge(params, current, duration, dt)?;
    Ok(result.delivered_energy_wh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutOfRangeKind;
    use crate::params::BoundPolicy;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_discharge_stops_at_exhaustion() {
        let params = CellParameters::linear_reference();
        let result = simulate_battery_discharge(&params, 1.0, 4000.0, 1.0).unwrap();

        assert_eq!(result.len(), 3601);
        assert_eq!(result.fault.map(|f| f.kind), Some(OutOfRangeKind::Exhausted));
        assert_eq!(result.soc[0], 1.0);
        assert_eq!(result.soc[3600], 0.0);
        assert_relative_eq!(result.times[3600], 3600.0);
        assert_relative_eq!(result.voltages[0], 4.1, epsilon = 1e-12);
    }

    #[test]
    fn test_short_discharge_has_no_fault() {
        let params = CellParameters::lithium_ion_18650();
        let result = simulate_battery_discharge(&params, 2.5, 600.0, 0.5).unwrap();
        assert_eq!(result.len(), 1201);
        assert!(result.fault.is_none());

        // voltage falls monotonically under constant load
        for i in 1..result.voltages.len() {
            assert!(result.voltages[i] <= result.voltages[i - 1] + 1e-12);
        }
        assert!(result.heat_flow.iter().all(|&q| q > 0.0));
    }

    #[test]
    fn test_delivered_energy_matches_mean_voltage() {
        let params = CellParameters::linear_reference();
        let energy = usable_energy_wh(&params, 1.0, 1.0).unwrap();
        // mean OCV 3.6 V minus 0.1 V drop, over one hour at 1 A
        assert_abs_diff_eq!(energy, 3.5, epsilon = 1e-3);
    }

    #[test]
    fn test_warn_policy_still_stops_at_exhaustion() {
        let fatal = CellParameters::linear_reference();
        let mut warn = fatal.clone();
        warn.bound_policy = BoundPolicy::Warn;

        let result = simulate_battery_discharge(&warn, 1.0, 8000.0, 1.0).unwrap();
        assert_eq!(result.len(), 3601);
        assert_eq!(result.fault.map(|f| f.kind), Some(OutOfRangeKind::Exhausted));
        assert!(result.soc.iter().all(|&soc| soc >= 0.0));

        let energy = usable_energy_wh(&warn, 1.0, 1.0).unwrap();
        assert_relative_eq!(energy, usable_energy_wh(&fatal, 1.0, 1.0).unwrap());
        assert_abs_diff_eq!(energy, 3.5, epsilon = 1e-3);
    }

    #[test]
    fn test_unbounded_duration_is_rejected() {
        let params = CellParameters::linear_reference();
        for duration in [f64::INFINITY, f64::NAN, -1.0] {
            assert!(matches!(
                simulate_battery_discharge(&params, 1.0, duration, 1.0),
                Err(BatteryError::Integrator(IntegratorError::InvalidInterval(_)))
            ));
        }
        // 2 * capacity / current overflows to infinity
        assert!(usable_energy_wh(&params, 1e-320, 1.0).is_err());
    }

    #[test]
    fn test_long_duration_does_not_overallocate() {
        let params = CellParameters::linear_reference();
        let result = simulate_battery_discharge(&params, 1.0, 1e300, 1.0).unwrap();
        assert_eq!(result.len(), 3601);
        assert_eq!(result.fault.map(|f| f.kind), Some(OutOfRangeKind::Exhausted));
    }

    #[test]
    fn test_usable_energy_needs_discharge_current() {
        let params = CellParameters::linear_reference();
        assert!(usable_energy_wh(&params, 0.0, 1.0).is_err());
        assert!(usable_energy_wh(&params, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_voltage_sag_is_worst_near_empty() {
        let params = CellParameters::linear_reference();
        let (min_voltage, soc) = voltage_sag_analysis(&params, 10.0).unwrap();
        assert_relative_eq!(soc, 0.05, epsilon = 1e-12);
        assert_relative_eq!(min_voltage, 3.0 + 1.2 * 0.05 - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_inputs_are_reported() {
        let mut params = CellParameters::linear_reference();
        assert!(simulate_battery_discharge(&params, 1.0, 10.0, 0.0).is_err());

        params.soc_min = 2.0;
        assert!(matches!(
            simulate_battery_discharge(&params, 1.0, 10.0, 1.0),
            Err(BatteryError::Configuration(_))
        ));
        assert!(voltage_sag_analysis(&params, 1.0).is_err());
    }
}
