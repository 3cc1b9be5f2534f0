//! Error types for the Voltaic circuit simulator.
//!
//! This module provides a unified error type [`SimError`] that covers
//! all error conditions that can occur while building a circuit graph,
//! stamping equations, solving them, and driving the simulation loop.

use thiserror::Error;

use crate::circuit::NodeId;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all Voltaic operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Structural Errors ============
    /// The graph contains no components at all
    #[error("No circuit")]
    NoCircuit,

    /// Node (or the subgraph containing it) has no path to ground
    #[error("Floating node '{node}' detected - no path to ground")]
    FloatingNode { node: NodeId },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Stamp-time Errors ============
    /// Physically invalid component parameter
    #[error("Invalid parameter '{param}' for component '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// More voltage sources stamped than the equation was sized for
    #[error("Already stamped declared number of voltage sources ({declared})")]
    VoltageSourceOverflow { declared: usize },

    // ============ Solver Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - circuit may have a short circuit or floating node")]
    SingularMatrix,

    /// Newton-Raphson exhausted every restart without meeting tolerance
    #[error("Newton-Raphson did not converge after {restarts} restarts (best residual: {residual:.2e})")]
    ConvergenceFailure { restarts: usize, residual: f64 },

    // ============ Configuration / I/O Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// Error reading circuit file
    #[error("Failed to read circuit file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Circuit description is not valid JSON for the expected schema
    #[error("Failed to parse circuit description: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
}

impl SimError {
    /// Create an invalid topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        component: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            component: component.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_simulation_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a convergence failure error
    pub fn convergence_failure(restarts: usize, residual: f64) -> Self {
        Self::ConvergenceFailure { restarts, residual }
    }

    /// Errors detected before any equation is built. Not retried until the
    /// topology changes.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NoCircuit | Self::FloatingNode { .. } | Self::InvalidTopology { .. }
        )
    }

    /// Errors raised by a solve call. The simulation loop zeroes the circuit
    /// state and keeps running when it sees one of these.
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, Self::SingularMatrix | Self::ConvergenceFailure { .. })
    }
}
