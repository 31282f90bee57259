//! The complete cell-stack model: SOC integrator, OCV curve, equivalent
//! circuit and thermal losses evaluated together once per step.

use simcore::{IntegrationScheme, Model, SimContext};

use crate::circuit::{EquivalentCircuitSolver, Excitation, Terminal};
use crate::error::{BatteryError, ConfigurationError, OutOfRangeError};
use crate::params::{BoundPolicy, CellParameters};
use crate::soc::{CellState, SocWindow, StateOfChargeIntegrator};
use crate::thermal::{LossBreakdown, ThermalLossAggregator, ThermalSink};

/// Observable outputs at the end of a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub time: f64,
    pub soc: f64,
    pub terminal: Terminal,
    pub open_circuit_voltage: f64,
    pub heat_flow: f64,
    pub temperature: f64,
}

impl StepOutput {
    pub fn power(&self) -> f64 {
        self.terminal.power()
    }
}

#[derive(Debug)]
pub struct BatteryCellModel {
    params: CellParameters,
    integrator: StateOfChargeIntegrator,
    circuit: EquivalentCircuitSolver,
    thermal: ThermalLossAggregator,
    sink: Option<Box<dyn ThermalSink>>,
    terminal: Terminal,
}

impl BatteryCellModel {
    /// Validates `params` and builds every sub-model. Fails before any step runs.
    pub fn new(params: CellParameters) -> Result<Self, ConfigurationError> {
        let integrator = StateOfChargeIntegrator::new(&params)?;
        let circuit = EquivalentCircuitSolver::from_params(&params)?;
        log::debug!(
            "battery model: {}s{}p, {:.1} V max, {:.4} Ω, {:?}",
            params.ns,
            params.np,
            params.stack_ocv_max(),
            params.stack_resistance(),
            circuit.self_discharge()
        );
        let terminal = Terminal::new(circuit.open_circuit_voltage(integrator.soc()), 0.0);
        Ok(BatteryCellModel {
            params,
            integrator,
            circuit,
            thermal: ThermalLossAggregator::new(),
            sink: None,
            terminal,
        })
    }

    /// Connects the thermal port. Its temperature then drives the series resistance.
    pub fn with_thermal_sink(mut self, sink: Box<dyn ThermalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.integrator = self.integrator.with_scheme(scheme);
        self
    }

    pub fn with_policy(mut self, policy: BoundPolicy) -> Self {
        self.integrator = self.integrator.with_policy(policy);
        self
    }

    pub fn params(&self) -> &CellParameters {
        &self.params
    }

    pub fn circuit(&self) -> &EquivalentCircuitSolver {
        &self.circuit
    }

    pub fn state(&self) -> &CellState {
        self.integrator.state()
    }

    pub fn soc(&self) -> f64 {
        self.integrator.soc()
    }

    pub fn soc_window(&self) -> SocWindow {
        self.integrator.window()
    }

    /// Terminal of the last completed step (open circuit before the first).
    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    pub fn fault(&self) -> Option<&OutOfRangeError> {
        self.integrator.fault()
    }

    pub fn heat_flow(&self) -> f64 {
        self.thermal.heat_flow()
    }

    pub fn losses(&self) -> LossBreakdown {
        self.thermal.breakdown()
    }

    pub fn has_thermal_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Operating temperature: the thermal port's, or `t_ref` when unconnected.
    pub fn temperature(&self) -> f64 {
        self.sink
            .as_ref()
            .map_or(self.params.t_ref, |sink| sink.temperature())
    }

    pub fn open_circuit_voltage(&self) -> f64 {
        self.circuit.open_circuit_voltage(self.soc())
    }

    /// Terminal operating point for `excitation` at the current state, without stepping.
    pub fn operating_point(&self, excitation: Excitation) -> Result<Terminal, BatteryError> {
        self.circuit.solve(self.soc(), excitation, self.temperature())
    }

    /// dSOC/dt at `state` for a given terminal current. No side effects.
    pub fn derivative(&self, state: &CellState, terminal_current: f64) -> f64 {
        let source_current = self.circuit.source_current(state.soc, terminal_current);
        self.integrator.soc_rate(source_current)
    }

    /// Residual of the circuit equation at `state`; zero when `terminal` is consistent.
    pub fn algebraic_residual(&self, state: &CellState, terminal: &Terminal) -> f64 {
        self.circuit.residual(state.soc, terminal, self.temperature())
    }

    /// Advances the model by `ctx.dt` under `excitation`.
    ///
    /// The excitation is held over the step. SOC is integrated first, then the
    /// terminal, losses and thermal port are evaluated at the new SOC.
    pub fn step(&mut self, ctx: SimContext, excitation: Excitation) -> Result<StepOutput, BatteryError> {
        if let (Some(&fault), BoundPolicy::Fatal) = (self.integrator.fault(), self.integrator.policy()) {
            return Err(fault.into());
        }
        let temperature = self.temperature();
        // Surfaces bad excitations and non-positive resistance before the state is touched.
        self.circuit.solve(self.soc(), excitation, temperature)?;

        let circuit = &self.circuit;
        let soc = self.integrator.integrate_with(
            |soc| {
                let terminal_current = match excitation {
                    Excitation::Current(current) => current,
                    Excitation::Voltage(voltage) => {
                        (circuit.open_circuit_voltage(soc) - voltage) / circuit.resistance(temperature)
                    }
                };
                circuit.source_current(soc, terminal_current)
            },
            &ctx,
        )?;

        self.terminal = self.circuit.solve(soc, excitation, temperature)?;
        let heat_flow = self
            .thermal
            .aggregate(&self.circuit, soc, self.terminal.current, temperature);
        match self.sink.as_mut() {
            Some(sink) => sink.absorb(heat_flow, &ctx),
            None => log::trace!("no thermal port, discarding {heat_flow:.4} W"),
        }

        Ok(StepOutput {
            time: ctx.end_time(),
            soc,
            terminal: self.terminal,
            open_circuit_voltage: self.circuit.open_circuit_voltage(soc),
            heat_flow,
            temperature,
        })
    }
}

impl Model for BatteryCellModel {
    fn reset(&mut self) {
        self.integrator.reset();
        self.thermal.reset();
        self.terminal = Terminal::new(self.circuit.open_circuit_voltage(self.integrator.soc()), 0.0);
    }
}
