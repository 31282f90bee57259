//! Equivalent circuit: OCV source with an optional self-discharge conductance
//! across it, in series with a temperature-dependent resistance.
//!
//! ```text
//!   p ──[ R0(T) ]──┬──────────┐
//!                  │          │
//!                (OCV)      [ G ]   (only when idis > 0)
//!                  │          │
//!   n ─────────────┴──────────┘
//! ```
//!
//! Currents are positive when the stack discharges into the external network.

use crate::error::{BatteryError, ConfigurationError};
use crate::ocv::OpenCircuitVoltageCurve;
use crate::params::CellParameters;

/// Self-discharge branch, decided once from the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelfDischarge {
    None,
    /// Stack conductance in siemens.
    Conductance(f64),
}

impl SelfDischarge {
    pub fn from_params(params: &CellParameters) -> Self {
        if params.idis > 0.0 {
            SelfDischarge::Conductance(params.self_discharge_conductance())
        } else {
            SelfDischarge::None
        }
    }

    /// Leakage current drawn from the source at open-circuit voltage `ocv`.
    pub fn current(&self, ocv: f64) -> f64 {
        match *self {
            SelfDischarge::None => 0.0,
            SelfDischarge::Conductance(g) => g * ocv,
        }
    }

    /// Power dissipated in the branch at open-circuit voltage `ocv`.
    pub fn dissipation(&self, ocv: f64) -> f64 {
        match *self {
            SelfDischarge::None => 0.0,
            SelfDischarge::Conductance(g) => g * ocv * ocv,
        }
    }
}

/// Two-pin electrical interface of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Terminal {
    pub voltage: f64,
    pub current: f64,
}

impl Terminal {
    pub fn new(voltage: f64, current: f64) -> Self {
        Terminal { voltage, current }
    }

    /// Power delivered to the network (W), negative while charging.
    pub fn power(&self) -> f64 {
        self.voltage * self.current
    }
}

/// Boundary condition imposed by the external network for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Excitation {
    /// Terminal current (A), positive = discharge.
    Current(f64),
    /// Terminal voltage (V).
    Voltage(f64),
}

impl Excitation {
    /// The imposed current or voltage.
    pub fn value(&self) -> f64 {
        match *self {
            Excitation::Current(value) | Excitation::Voltage(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EquivalentCircuitSolver {
    ocv: OpenCircuitVoltageCurve,
    self_discharge: SelfDischarge,
    resistance_ref: f64,
    alpha: f64,
    t_ref: f64,
}

impl EquivalentCircuitSolver {
    pub fn from_params(params: &CellParameters) -> Result<Self, ConfigurationError> {
        let ocv = OpenCircuitVoltageCurve::from_params(params)?;
        Ok(EquivalentCircuitSolver {
            ocv,
            self_discharge: SelfDischarge::from_params(params),
            resistance_ref: params.stack_resistance(),
            alpha: params.alpha,
            t_ref: params.t_ref,
        })
    }

    pub fn ocv_curve(&self) -> &OpenCircuitVoltageCurve {
        &self.ocv
    }

    pub fn self_discharge(&self) -> SelfDischarge {
        self.self_discharge
    }

    pub fn reference_temperature(&self) -> f64 {
        self.t_ref
    }

    /// Stack series resistance at `temperature` (K).
    pub fn resistance(&self, temperature: f64) -> f64 {
        self.resistance_ref * (1.0 + self.alpha * (temperature - self.t_ref))
    }

    pub fn open_circuit_voltage(&self, soc: f64) -> f64 {
        self.ocv.voltage(soc)
    }

    pub fn terminal_voltage(&self, soc: f64, current: f64, temperature: f64) -> f64 {
        self.ocv.voltage(soc) - current * self.resistance(temperature)
    }

    /// Current drawn from the ideal source: terminal current plus leakage.
    pub fn source_current(&self, soc: f64, terminal_current: f64) -> f64 {
        terminal_current + self.self_discharge.current(self.ocv.voltage(soc))
    }

    /// Resolves the terminal operating point for a given boundary condition.
    pub fn solve(&self, soc: f64, excitation: Excitation, temperature: f64) -> Result<Terminal, BatteryError> {
        let resistance = self.resistance(temperature);
        let ocv = self.ocv.voltage(soc);
        if !excitation.value().is_finite() {
            return Err(BatteryError::NonFiniteExcitation(excitation.value()));
        }
        match excitation {
            Excitation::Current(current) => {
                if resistance < 0.0 {
                    return Err(BatteryError::NonPositiveResistance { resistance, temperature });
                }
                Ok(Terminal::new(ocv - current * resistance, current))
            }
            Excitation::Voltage(voltage) => {
                if resistance <= 0.0 {
                    return Err(BatteryError::NonPositiveResistance { resistance, temperature });
                }
                Ok(Terminal::new(voltage, (ocv - voltage) / resistance))
            }
        }
    }

    /// `V - (OCV(soc) - I * R(T))`; zero when the terminal is consistent with the circuit.
    pub fn residual(&self, soc: f64, terminal: &Terminal, temperature: f64) -> f64 {
        terminal.voltage - self.terminal_voltage(soc, terminal.current, temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(params: &CellParameters) -> EquivalentCircuitSolver {
        EquivalentCircuitSolver::from_params(params).unwrap()
    }

    #[test]
    fn no_self_discharge_branch_without_idis() {
        let params = CellParameters::linear_reference();
        let circuit = solver(&params);
        assert_eq!(circuit.self_discharge(), SelfDischarge::None);
        assert_eq!(circuit.source_current(0.5, 2.0), 2.0);
    }

    #[test]
    fn self_discharge_conductance_from_idis() {
        let mut params = CellParameters::linear_reference();
        params.ns = 2;
        params.np = 3;
        params.idis = 0.01;
        let circuit = solver(&params);
        let g = 3.0 * 0.01 / (2.0 * 4.2);
        assert_eq!(circuit.self_discharge(), SelfDischarge::Conductance(g));

        // At full charge the leakage equals np * idis.
        assert_relative_eq!(circuit.source_current(1.0, 0.0), 0.03, epsilon = 1e-12);
        assert_relative_eq!(circuit.source_current(1.0, 1.5), 1.53, epsilon = 1e-12);
    }

    #[test]
    fn current_excitation_drops_across_r0() {
        let params = CellParameters::linear_reference();
        let circuit = solver(&params);
        let terminal = circuit.solve(1.0, Excitation::Current(1.0), params.t_ref).unwrap();
        assert_relative_eq!(terminal.voltage, 4.2 - 0.1, epsilon = 1e-12);
        assert_relative_eq!(terminal.power(), (4.2 - 0.1) * 1.0, epsilon = 1e-12);

        let charging = circuit.solve(1.0, Excitation::Current(-2.0), params.t_ref).unwrap();
        assert_relative_eq!(charging.voltage, 4.4, epsilon = 1e-12);
        assert!(charging.power() < 0.0);
    }

    #[test]
    fn voltage_excitation_solves_for_current() {
        let params = CellParameters::linear_reference();
        let circuit = solver(&params);
        let terminal = circuit.solve(1.0, Excitation::Voltage(4.0), params.t_ref).unwrap();
        assert_relative_eq!(terminal.current, 2.0, epsilon = 1e-9);
        assert_relative_eq!(circuit.residual(1.0, &terminal, params.t_ref), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn voltage_excitation_needs_resistance() {
        let mut params = CellParameters::linear_reference();
        params.r0 = 0.0;
        let circuit = solver(&params);
        assert!(matches!(
            circuit.solve(1.0, Excitation::Voltage(4.0), params.t_ref),
            Err(BatteryError::NonPositiveResistance { .. })
        ));
        // a current-driven ideal source is fine
        let terminal = circuit.solve(1.0, Excitation::Current(3.0), params.t_ref).unwrap();
        assert_relative_eq!(terminal.voltage, 4.2, epsilon = 1e-12);
    }

    #[test]
    fn resistance_follows_temperature() {
        let mut params = CellParameters::linear_reference();
        params.alpha = 0.004;
        let circuit = solver(&params);
        assert_relative_eq!(circuit.resistance(params.t_ref), 0.1, epsilon = 1e-12);
        assert_relative_eq!(circuit.resistance(params.t_ref + 25.0), 0.11, epsilon = 1e-12);
        assert_relative_eq!(circuit.resistance(params.t_ref - 25.0), 0.09, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_excitation_is_rejected() {
        let params = CellParameters::linear_reference();
        let circuit = solver(&params);
        for excitation in [Excitation::Current(f64::NAN), Excitation::Voltage(f64::INFINITY)] {
            assert!(matches!(
                circuit.solve(1.0, excitation, params.t_ref),
                Err(BatteryError::NonFiniteExcitation(_))
            ));
        }
    }

    #[test]
    fn residual_measures_inconsistency() {
        let params = CellParameters::linear_reference();
        let circuit = solver(&params);
        let terminal = Terminal::new(4.0, 1.0);
        // expected 4.1 V at full charge and 1 A
        assert_relative_eq!(circuit.residual(1.0, &terminal, params.t_ref), -0.1, epsilon = 1e-12);
    }
}
