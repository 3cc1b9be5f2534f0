//! # Voltaic Core
//!
//! A lightweight circuit-simulation kernel.
//!
//! This library provides:
//! - A JSON circuit description format
//! - Modified Nodal Analysis (MNA) equation assembly
//! - A direct solver for linear circuits and a damped Newton-Raphson solver
//!   for circuits with diodes or MOSFETs
//! - Fixed-timestep transient simulation with trapezoidal companion models
//!
//! ## Architecture
//!
//! - [`circuit`] - Circuit graph, description format and validation
//! - [`components`] - Component models and their stamps
//! - [`solver`] - MNA assembly, linear and nonlinear solving, simulation loop
//! - [`error`] - The crate-wide error type
//!
//! ## Usage
//!
//! ```no_run
//! use voltaic_core::{CircuitDescription, Simulator};
//!
//! let description = CircuitDescription::from_file("rc.json")?;
//! let mut sim = Simulator::new();
//! sim.load_description(&description)?;
//! sim.start();
//! // One 16 ms frame of real time
//! let steps = sim.advance(16.0);
//! println!("{steps} steps, max |V| = {}", sim.max_abs_voltage());
//! # Ok::<(), voltaic_core::SimError>(())
//! ```
//!
//! ## Simulation Method
//!
//! For each timestep:
//!
//! 1. Copy the static equation (resistors, sources, op-amps)
//! 2. Stamp companion models of capacitors and inductors from the previous
//!    state, and time-varying sources at the new time
//! 3. Solve `Ax = b` directly, or iterate with Newton-Raphson when nonlinear
//!    elements are present
//! 4. Derive every component's voltages and currents

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::{CircuitDescription, CircuitGraph};
pub use error::{Result, SimError};
pub use solver::{Simulator, SimulatorConfig};

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
