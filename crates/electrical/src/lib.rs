//! Equivalent-circuit model of a battery cell stack.
//!
//! A stack of `ns` series by `np` parallel cells is reduced to an
//! open-circuit voltage source driven by state of charge, an optional
//! self-discharge conductance across it and a temperature-dependent series
//! resistance. [`BatteryCellModel`] evaluates the four parts together:
//!
//! - [`soc::StateOfChargeIntegrator`] integrates current into SOC and checks its window,
//! - [`ocv::OpenCircuitVoltageCurve`] maps SOC to open-circuit voltage,
//! - [`circuit::EquivalentCircuitSolver`] resolves the terminal voltage and current,
//! - [`thermal::ThermalLossAggregator`] sums the dissipated heat.

pub mod analysis;
pub mod cell;
pub mod circuit;
pub mod error;
pub mod host;
pub mod ocv;
pub mod params;
pub mod soc;
pub mod thermal;

pub use cell::{BatteryCellModel, StepOutput};
pub use circuit::{EquivalentCircuitSolver, Excitation, SelfDischarge, Terminal};
pub use error::{BatteryError, ConfigurationError, OutOfRangeError, OutOfRangeKind};
pub use ocv::OpenCircuitVoltageCurve;
pub use params::{BoundPolicy, CellParameters, OcvSource, Smoothness};
pub use soc::{CellState, SocWindow, StateOfChargeIntegrator};
pub use thermal::{LossBreakdown, LumpedThermalMass, ThermalLossAggregator, ThermalSink};
