use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OdeSystem, SimContext};

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum IntegratorError {
    #[error("step size must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("cannot advance by a negative or non-finite interval ({0})")]
    InvalidInterval(f64),
}

/// A generic integration strategy trait.
pub trait Integrator {
    /// Returns the state after advancing `y` by `ctx.dt` starting at `ctx.t`.
    fn step<S, const N: usize>(&self, ctx: &SimContext, system: &S, y: &SVector<f64, N>) -> SVector<f64, N>
    where
        S: OdeSystem<N>;
}

/// Explicit (forward) Euler.
/// First-order accurate, one derivative evaluation per step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl Integrator for ExplicitEuler {
    fn step<S, const N: usize>(&self, ctx: &SimContext, system: &S, y: &SVector<f64, N>) -> SVector<f64, N>
    where
        S: OdeSystem<N>,
    {
        y + system.derivative(ctx.t, y) * ctx.dt
    }
}

/// Trapezoidal predictor-corrector (Heun's method).
/// Second-order accurate, two derivative evaluations per step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trapezoidal;

impl Integrator for Trapezoidal {
    fn step<S, const N: usize>(&self, ctx: &SimContext, system: &S, y: &SVector<f64, N>) -> SVector<f64, N>
    where
        S: OdeSystem<N>,
    {
        let dt = ctx.dt;
        let k1 = system.derivative(ctx.t, y);
        let predictor = y + k1 * dt;
        let k2 = system.derivative(ctx.t + dt, &predictor);
        y + (k1 + k2) * dt / 2.0
    }
}

/// Classic fourth-order Runge-Kutta integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta4;

impl Integrator for RungeKutta4 {
    fn step<S, const N: usize>(&self, ctx: &SimContext, system: &S, y: &SVector<f64, N>) -> SVector<f64, N>
    where
        S: OdeSystem<N>,
    {
        let dt = ctx.dt;
        let half = dt / 2.0;
        let k1 = system.derivative(ctx.t, y);
        let k2 = system.derivative(ctx.t + half, &(y + k1 * half));
        let k3 = system.derivative(ctx.t + half, &(y + k2 * half));
        let k4 = system.derivative(ctx.t + dt, &(y + k3 * dt));
        // Divide last so a constant derivative integrates without rounding drift.
        y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * dt / 6.0
    }
}

/// Selectable integration scheme, usable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationScheme {
    #[default]
    ExplicitEuler,
    Trapezoidal,
    RungeKutta4,
}

impl Integrator for IntegrationScheme {
    fn step<S, const N: usize>(&self, ctx: &SimContext, system: &S, y: &SVector<f64, N>) -> SVector<f64, N>
    where
        S: OdeSystem<N>,
    {
        match self {
            IntegrationScheme::ExplicitEuler => ExplicitEuler.step(ctx, system, y),
            IntegrationScheme::Trapezoidal => Trapezoidal.step(ctx, system, y),
            IntegrationScheme::RungeKutta4 => RungeKutta4.step(ctx, system, y),
        }
    }
}

/// Relative slack used when deciding whether one more fixed step fits into
/// the accumulator. Keeps `0.3 / 0.1` from losing a step to rounding.
const STEP_FIT_SLACK: f64 = 1e-9;

/// Fixed-timestep driver that accumulates time and runs as many fixed
/// sub-steps as fit into each requested interval.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    fixed_dt: f64,
    accumulator: f64,
    steps: u64,
}

impl FixedTimestep {
    pub fn new(fixed_dt: f64) -> Result<Self, IntegratorError> {
        if !(fixed_dt.is_finite() && fixed_dt > 0.0) {
            return Err(IntegratorError::InvalidStep(fixed_dt));
        }
        Ok(FixedTimestep {
            fixed_dt,
            accumulator: 0.0,
            steps: 0,
        })
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Simulated time covered by completed sub-steps.
    pub fn time(&self) -> f64 {
        self.steps as f64 * self.fixed_dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Advances by `dt`, calling `step_fn` once per fixed sub-step.
    ///
    /// Returns the time left in the accumulator that did not fit into a full
    /// step. Stops at the first sub-step error; the failing sub-step is not
    /// counted.
    pub fn advance<E, F>(&mut self, dt: f64, mut step_fn: F) -> Result<f64, E>
    where
        E: From<IntegratorError>,
        F: FnMut(SimContext) -> Result<(), E>,
    {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(IntegratorError::InvalidInterval(dt).into());
        }
        self.accumulator += dt;
        let threshold = self.fixed_dt * (1.0 - STEP_FIT_SLACK);

        let mut taken = 0u64;
        while self.accumulator >= threshold {
            let ctx = SimContext::new(self.fixed_dt, self.time());
            step_fn(ctx)?;
            self.accumulator = (self.accumulator - self.fixed_dt).max(0.0);
            self.steps += 1;
            taken += 1;
        }
        log::trace!("fixed timestep advanced {taken} sub-steps, t = {:.6}", self.time());

        Ok(self.accumulator)
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.steps = 0;
    }
}
