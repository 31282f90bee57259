use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// Timing information handed to every model step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimContext {
    pub dt: f64,
    pub t: f64,
}

impl SimContext {
    pub fn new(dt: f64, t: f64) -> Self {
        SimContext { dt, t }
    }

    /// Time at the end of this step.
    pub fn end_time(&self) -> f64 {
        self.t + self.dt
    }
}

pub trait Model {
    fn reset(&mut self);
}

/// A system of first-order ODEs with `N` state variables.
///
/// `derivative` is called by the integrators at solver-chosen points, so it
/// must not mutate anything.
pub trait OdeSystem<const N: usize> {
    fn derivative(&self, t: f64, y: &SVector<f64, N>) -> SVector<f64, N>;
}
