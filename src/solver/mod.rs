//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = b where:
//! - x contains node voltages and branch currents
//! - A is the admittance/coefficient matrix
//! - b is the input vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is 0 except for controlled sources
//! - v is the vector of node voltages
//! - j is the vector of voltage source currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! Circuits without nonlinear elements are solved directly with
//! [`solve_linear`]. Otherwise [`NewtonRaphson`] iterates on the residual of
//! the same system plus the nonlinear element currents.

mod companion;
mod equation;
mod linear;
mod matrix;
mod mna;
mod newton;
mod rng;
mod simulator;
mod state;

pub use companion::Companion;
pub use equation::{Equation, MIN_NUM_OF_NODES};
pub use linear::solve_linear;
pub use matrix::{norm, Matrix};
pub use mna::{
    build_static_equation, derive_component_state, solve, stamp_dynamic_equation, MnaSystem,
};
pub use newton::{
    NewtonConfig, NewtonRaphson, NewtonSolution, NonlinearElement, NonlinearSystem, UnknownKind,
};
pub use rng::{RandomSource, SplitMix64};
pub use simulator::{Simulator, SimulatorConfig};
pub use state::{CircuitState, ComponentState, CurrentRecoveries, CurrentRecovery, Solution};

/// Convergence tolerance on the Newton-Raphson residual norm.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Maximum Newton-Raphson iterations per attempt.
pub const MAX_ITERATIONS: usize = 100;

/// Maximum Newton-Raphson attempts per solve.
pub const MAX_RESTARTS: usize = 20;

/// Conductance from every node to ground added during nonlinear solves.
pub const MIN_CONDUCTANCE: f64 = 1e-12;

/// Smallest pivot magnitude accepted by the linear solver.
pub const PIVOT_EPSILON: f64 = 1e-15;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 0x5eed_c1c0;

/// Default simulation timestep in seconds (5 µs).
pub const DEFAULT_TIMESTEP: f64 = 5e-6;

/// Default simulated seconds per real second.
pub const DEFAULT_SIM_TIME_PER_SEC: f64 = 1e-3;
