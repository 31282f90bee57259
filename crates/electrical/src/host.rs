//! Adapter exposing the cell model to the `ode_solvers` steppers, for hosts
//! that want an external integrator instead of [`BatteryCellModel::step`].

use ode_solvers::{Rk4, System, Vector1};

use crate::cell::BatteryCellModel;
use crate::circuit::Excitation;
use crate::error::{BatteryError, OutOfRangeError};
use crate::soc::{CellState, SocWindow};

type State = Vector1<f64>;

/// SOC dynamics of a model under a fixed excitation, with `y = [soc]`.
///
/// Integration stops at the first output point outside the SOC window.
#[derive(Debug)]
pub struct CellOdeSystem<'a> {
    model: &'a BatteryCellModel,
    excitation: Excitation,
    temperature: f64,
    window: SocWindow,
}

impl<'a> CellOdeSystem<'a> {
    /// Fails when the excitation cannot be resolved at the model's temperature.
    pub fn new(model: &'a BatteryCellModel, excitation: Excitation) -> Result<Self, BatteryError> {
        model.operating_point(excitation)?;
        Ok(CellOdeSystem {
            model,
            excitation,
            temperature: model.temperature(),
            window: model.soc_window(),
        })
    }

    /// dSOC/dt at `soc`.
    pub fn soc_rate(&self, soc: f64) -> f64 {
        let circuit = self.model.circuit();
        let current = match self.excitation {
            Excitation::Current(current) => current,
            Excitation::Voltage(voltage) => {
                (circuit.open_circuit_voltage(soc) - voltage) / circuit.resistance(self.temperature)
            }
        };
        let state = CellState {
            soc,
            discharged_charge: 0.0,
        };
        self.model.derivative(&state, current)
    }
}

impl System<f64, State> for CellOdeSystem<'_> {
    fn system(&self, _t: f64, y: &State, dy: &mut State) {
        dy[0] = self.soc_rate(y[0]);
    }

    fn solout(&mut self, t: f64, y: &State, _dy: &State) -> bool {
        self.window.check(y[0], t).is_some()
    }
}

/// Final point of an externally integrated run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostRun {
    pub time: f64,
    pub soc: f64,
    pub fault: Option<OutOfRangeError>,
}

/// Integrates SOC from the model's current state over `[0, duration]` with
/// the fixed-step RK4 of `ode_solvers`. The model itself is not mutated.
pub fn integrate_with_rk4(
    model: &BatteryCellModel,
    excitation: Excitation,
    duration: f64,
    step: f64,
) -> Result<HostRun, BatteryError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(simcore::IntegratorError::InvalidStep(step).into());
    }
    let system = CellOdeSystem::new(model, excitation)?;
    let window = system.window;
    let mut stepper = Rk4::new(system, 0.0, State::new(model.soc()), duration, step);
    stepper.integrate().map_err(|e| BatteryError::HostSolver(format!("{e:?}")))?;

    let (time, soc) = match (stepper.x_out().last(), stepper.y_out().last()) {
        (Some(&time), Some(y)) => (time, y[0]),
        _ => (0.0, model.soc()),
    };
    Ok(HostRun {
        time,
        soc,
        fault: window.check(soc, time),
    })
}
