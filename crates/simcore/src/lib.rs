//! Shared simulation plumbing: step context, model traits and fixed-step integrators.

pub mod integrators;
pub mod traits;

pub use integrators::{
    ExplicitEuler, FixedTimestep, IntegrationScheme, Integrator, IntegratorError, RungeKutta4, Trapezoidal,
};
pub use traits::{Model, OdeSystem, SimContext};
