//! State-of-charge integration and the SOC window check.

use nalgebra::Vector1;
use simcore::{IntegrationScheme, Integrator, IntegratorError, OdeSystem, SimContext};

use crate::error::{BatteryError, ConfigurationError, OutOfRangeError, OutOfRangeKind};
use crate::params::{BoundPolicy, CellParameters};

/// The single persistent state of a cell stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellState {
    pub soc: f64,
    /// Integral of the source current since initialization (A·s).
    pub discharged_charge: f64,
}

impl CellState {
    pub fn initial(params: &CellParameters) -> Self {
        CellState {
            soc: params.soc_max,
            discharged_charge: 0.0,
        }
    }
}

/// Allowed SOC range, open on both sides by the tolerance ε.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocWindow {
    pub min: f64,
    pub max: f64,
    pub tolerance: f64,
}

impl SocWindow {
    pub fn from_params(params: &CellParameters) -> Self {
        SocWindow {
            min: params.soc_min,
            max: params.soc_max,
            tolerance: params.soc_tolerance,
        }
    }

    /// `Some` when `soc` is at or beyond `max + ε` or at or below `min - ε`.
    pub fn check(&self, soc: f64, time: f64) -> Option<OutOfRangeError> {
        let upper = self.max + self.tolerance;
        let lower = self.min - self.tolerance;
        if soc >= upper {
            Some(OutOfRangeError {
                kind: OutOfRangeKind::Overcharged,
                soc,
                bound: upper,
                time,
            })
        } else if soc <= lower {
            Some(OutOfRangeError {
                kind: OutOfRangeKind::Exhausted,
                soc,
                bound: lower,
                time,
            })
        } else {
            None
        }
    }
}

/// dq/dt = source current, where the current may depend on the SOC reached.
struct ChargeBalance<F> {
    soc_max: f64,
    capacity: f64,
    source_current: F,
}

impl<F: Fn(f64) -> f64> OdeSystem<1> for ChargeBalance<F> {
    fn derivative(&self, _t: f64, y: &Vector1<f64>) -> Vector1<f64> {
        let soc = self.soc_max - y[0] / self.capacity;
        Vector1::new((self.source_current)(soc))
    }
}

/// Owns the [`CellState`] and advances it by integrating the source current.
///
/// SOC is never clamped. After each step it must stay strictly inside
/// `(soc_min - ε, soc_max + ε)`; leaving that window is reported according to
/// the configured [`BoundPolicy`].
#[derive(Debug, Clone)]
pub struct StateOfChargeIntegrator {
    state: CellState,
    window: SocWindow,
    capacity: f64,
    policy: BoundPolicy,
    scheme: IntegrationScheme,
    fault: Option<OutOfRangeError>,
}

impl StateOfChargeIntegrator {
    pub fn new(params: &CellParameters) -> Result<Self, ConfigurationError> {
        params.validate()?;
        Ok(StateOfChargeIntegrator {
            state: CellState::initial(params),
            window: SocWindow::from_params(params),
            capacity: params.stack_capacity(),
            policy: params.bound_policy,
            scheme: params.integration,
            fault: None,
        })
    }

    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_policy(mut self, policy: BoundPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn soc(&self) -> f64 {
        self.state.soc
    }

    pub fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }

    pub fn window(&self) -> SocWindow {
        self.window
    }

    pub fn policy(&self) -> BoundPolicy {
        self.policy
    }

    /// The violation seen at the last step, if SOC is outside its window.
    pub fn fault(&self) -> Option<&OutOfRangeError> {
        self.fault.as_ref()
    }

    /// dSOC/dt for a given source current. Positive current discharges.
    pub fn soc_rate(&self, source_current: f64) -> f64 {
        -source_current / self.capacity
    }

    /// Advances SOC under a constant source current over `ctx.dt`.
    pub fn integrate(&mut self, current: f64, ctx: &SimContext) -> Result<f64, BatteryError> {
        self.integrate_with(|_| current, ctx)
    }

    /// Advances SOC with a source current that may depend on SOC, e.g. when a
    /// self-discharge branch leaks more at higher open-circuit voltage.
    pub fn integrate_with<F>(&mut self, source_current: F, ctx: &SimContext) -> Result<f64, BatteryError>
    where
        F: Fn(f64) -> f64,
    {
        if let (Some(fault), BoundPolicy::Fatal) = (self.fault, self.policy) {
            return Err(fault.into());
        }
        if !(ctx.dt.is_finite() && ctx.dt >= 0.0) {
            return Err(IntegratorError::InvalidStep(ctx.dt).into());
        }

        let system = ChargeBalance {
            soc_max: self.window.max,
            capacity: self.capacity,
            source_current,
        };
        let charge = self.scheme.step(ctx, &system, &Vector1::new(self.state.discharged_charge))[0];
        let soc = self.window.max - charge / self.capacity;
        // NaN compares false against both bounds, so it never reaches the window check.
        if !soc.is_finite() {
            return Err(BatteryError::NonFiniteState {
                soc,
                time: ctx.end_time(),
            });
        }
        self.state.discharged_charge = charge;
        self.state.soc = soc;
        log::trace!("t = {:.3} s: soc = {:.9}", ctx.end_time(), self.state.soc);

        match self.window.check(self.state.soc, ctx.end_time()) {
            None => {
                self.fault = None;
                Ok(self.state.soc)
            }
            Some(fault) => self.report(fault),
        }
    }

    fn report(&mut self, fault: OutOfRangeError) -> Result<f64, BatteryError> {
        let first = self.fault.is_none_or(|previous| previous.kind != fault.kind);
        self.fault = Some(fault);
        match self.policy {
            BoundPolicy::Fatal => {
                log::error!("{fault}");
                Err(fault.into())
            }
            BoundPolicy::Warn => {
                if first {
                    log::warn!("{fault}; continuing");
                }
                Ok(self.state.soc)
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = CellState {
            soc: self.window.max,
            discharged_charge: 0.0,
        };
        self.fault = None;
    }
}
