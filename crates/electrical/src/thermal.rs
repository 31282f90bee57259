//! Heat produced by the stack and the optional thermal port it flows into.

use std::fmt;

use simcore::SimContext;

use crate::circuit::EquivalentCircuitSolver;
use crate::error::ConfigurationError;

/// Receiver of the stack's dissipated heat.
///
/// The sink's temperature is fed back into the series resistance. Without a
/// sink the stack runs at its reference temperature and the heat is dropped.
pub trait ThermalSink: fmt::Debug {
    /// Current port temperature (K).
    fn temperature(&self) -> f64;

    /// Takes in `heat_flow` watts over `ctx.dt` seconds.
    fn absorb(&mut self, heat_flow: f64, ctx: &SimContext);
}

/// Single thermal mass with a linear conductance to a fixed ambient.
///
/// dT/dt = (Q - G * (T - T_ambient)) / C
#[derive(Debug, Clone, PartialEq)]
pub struct LumpedThermalMass {
    heat_capacity: f64,
    conductance: f64,
    ambient: f64,
    temperature: f64,
}

impl LumpedThermalMass {
    /// `heat_capacity` in J/K, `conductance` to ambient in W/K, temperatures in K.
    /// Starts at the ambient temperature.
    pub fn new(heat_capacity: f64, conductance: f64, ambient: f64) -> Result<Self, ConfigurationError> {
        if !heat_capacity.is_finite() || heat_capacity <= 0.0 {
            return Err(ConfigurationError::NonPositive { field: "heat_capacity", value: heat_capacity });
        }
        if !conductance.is_finite() || conductance < 0.0 {
            return Err(ConfigurationError::Negative { field: "conductance", value: conductance });
        }
        if !ambient.is_finite() || ambient <= 0.0 {
            return Err(ConfigurationError::NonPositive { field: "ambient", value: ambient });
        }
        Ok(LumpedThermalMass {
            heat_capacity,
            conductance,
            ambient,
            temperature: ambient,
        })
    }

    pub fn ambient(&self) -> f64 {
        self.ambient
    }
}

impl ThermalSink for LumpedThermalMass {
    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn absorb(&mut self, heat_flow: f64, ctx: &SimContext) {
        let loss = self.conductance * (self.temperature - self.ambient);
        self.temperature += (heat_flow - loss) / self.heat_capacity * ctx.dt;
    }
}

/// Split of the dissipated power (W).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossBreakdown {
    pub resistive: f64,
    pub self_discharge: f64,
}

impl LossBreakdown {
    pub fn total(&self) -> f64 {
        self.resistive + self.self_discharge
    }
}

/// Sums series-resistance and self-discharge losses into one heat flow.
#[derive(Debug, Clone, Default)]
pub struct ThermalLossAggregator {
    last: LossBreakdown,
}

impl ThermalLossAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Losses at an operating point, without touching the stored value.
    pub fn losses(
        circuit: &EquivalentCircuitSolver,
        soc: f64,
        terminal_current: f64,
        temperature: f64,
    ) -> LossBreakdown {
        let ocv = circuit.open_circuit_voltage(soc);
        LossBreakdown {
            resistive: terminal_current * terminal_current * circuit.resistance(temperature),
            self_discharge: circuit.self_discharge().dissipation(ocv),
        }
    }

    /// Recomputes the losses for this step and returns the total heat flow.
    pub fn aggregate(
        &mut self,
        circuit: &EquivalentCircuitSolver,
        soc: f64,
        terminal_current: f64,
        temperature: f64,
    ) -> f64 {
        self.last = Self::losses(circuit, soc, terminal_current, temperature);
        self.last.total()
    }

    /// Heat flow (W) of the most recent step.
    pub fn heat_flow(&self) -> f64 {
        self.last.total()
    }

    pub fn breakdown(&self) -> LossBreakdown {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = LossBreakdown::default();
    }
}
