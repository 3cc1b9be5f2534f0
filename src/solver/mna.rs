//! MNA assembly, solving and state derivation for a circuit graph.
//!
//! One simulation tick runs:
//! 1. [`build_static_equation`] once per topology change
//! 2. `clone()` of the static equation
//! 3. [`stamp_dynamic_equation`] on the copy
//! 4. [`solve`]
//! 5. [`derive_component_state`] on the ground-prefixed solution

use tracing::{debug, trace};

use crate::circuit::{validate_circuit, CircuitGraph};
use crate::error::{Result, SimError};

use super::equation::Equation;
use super::matrix::Matrix;
use super::newton::{NewtonRaphson, NonlinearElement, NonlinearSystem, UnknownKind};
use super::rng::RandomSource;
use super::state::{CircuitState, ComponentState, CurrentRecoveries, Solution};
use super::MIN_CONDUCTANCE;

/// Initial guess for branch-current unknowns (A).
const INITIAL_BRANCH_CURRENT: f64 = 1e-4;

/// Validate the graph and stamp every time-independent contribution.
pub fn build_static_equation(graph: &CircuitGraph) -> Result<Equation> {
    validate_circuit(graph)?;

    let mut equation = Equation::new(graph.num_nodes(), graph.num_vsources())?;
    for component in graph.components() {
        component.stamp(&mut equation)?;
    }

    debug!(
        nodes = graph.num_nodes(),
        vsources = graph.num_vsources(),
        size = equation.size(),
        "built static equation"
    );
    Ok(equation)
}

/// Stamp companion models and time-varying sources for one tick.
///
/// `previous` is the state derived from the last tick. Components missing
/// from it start from zero.
pub fn stamp_dynamic_equation(
    graph: &CircuitGraph,
    equation: &mut Equation,
    timestep: f64,
    sim_time: f64,
    previous: &CircuitState,
) -> Result<CurrentRecoveries> {
    if !(timestep > 0.0 && timestep.is_finite()) {
        return Err(SimError::invalid_parameter(
            "simulation",
            "timestep",
            format!("must be > 0, was: {timestep}"),
        ));
    }

    let zero = ComponentState::default();
    let mut recoveries = CurrentRecoveries::new();
    for component in graph.components() {
        let prev = previous.get(&component.id()).unwrap_or(&zero);
        if let Some(recovery) = component.stamp_dynamic(equation, timestep, sim_time, prev)? {
            recoveries.insert(component.id(), recovery);
        }
    }
    Ok(recoveries)
}

/// Solve an equation, directly when there are no nonlinear elements and with
/// Newton-Raphson otherwise. Returns the unknowns without the ground entry.
pub fn solve<R: RandomSource>(
    equation: &Equation,
    elements: &[&dyn NonlinearElement],
    newton: &mut NewtonRaphson<R>,
) -> Result<Vec<f64>> {
    if elements.is_empty() {
        return equation.solve_linear();
    }

    let system = MnaSystem::new(equation, elements);
    let solution = newton.solve(&system)?;
    trace!(
        iterations = solution.iterations,
        restarts = solution.restarts,
        residual = solution.residual,
        "nonlinear solve finished"
    );
    Ok(solution.x)
}

/// Per-component voltages and currents of a solved tick.
///
/// `solution` must have the 0 V ground entry prepended. Currents come from
/// the tick's recoveries when present, else from the component itself.
pub fn derive_component_state(
    graph: &CircuitGraph,
    solution: &[f64],
    recoveries: &CurrentRecoveries,
) -> CircuitState {
    let view = Solution::new(solution, graph.num_nodes());
    graph
        .components()
        .map(|component| {
            let voltages: Vec<f64> = component
                .nodes()
                .iter()
                .map(|&node| view.voltage(node))
                .collect();
            let currents = match recoveries.get(&component.id()) {
                Some(recover) => recover(&voltages),
                None => component.currents(&view),
            };
            (component.id(), ComponentState { voltages, currents })
        })
        .collect()
}

/// `F(x) = A x - b + gmin * x + Σ i(x)` for an MNA equation with nonlinear
/// elements. `gmin` and the element currents only touch node rows.
pub struct MnaSystem<'a> {
    equation: &'a Equation,
    elements: &'a [&'a dyn NonlinearElement],
    gmin: f64,
}

impl<'a> MnaSystem<'a> {
    pub fn new(equation: &'a Equation, elements: &'a [&'a dyn NonlinearElement]) -> Self {
        Self {
            equation,
            elements,
            gmin: MIN_CONDUCTANCE,
        }
    }

    /// Override the conductance added from every node to ground.
    pub fn with_gmin(mut self, gmin: f64) -> Self {
        self.gmin = gmin;
        self
    }
}

impl NonlinearSystem for MnaSystem<'_> {
    fn len(&self) -> usize {
        self.equation.size()
    }

    fn residual(&self, x: &[f64]) -> Vec<f64> {
        let mut f = self.equation.admittances.mul_vec(x);
        for (fi, bi) in f.iter_mut().zip(&self.equation.inputs) {
            *fi -= bi;
        }
        for i in 0..self.equation.num_node_rows() {
            f[i] += self.gmin * x[i];
        }
        for element in self.elements {
            element.evaluate(x, &mut f);
        }
        f
    }

    fn jacobian(&self, x: &[f64]) -> Matrix {
        let mut jacobian = self.equation.admittances.clone();
        for i in 0..self.equation.num_node_rows() {
            jacobian.add(i, i, self.gmin);
        }
        for element in self.elements {
            element.jacobian(x, &mut jacobian);
        }
        jacobian
    }

    fn unknown_kind(&self, index: usize) -> UnknownKind {
        if index < self.equation.num_node_rows() {
            UnknownKind::Voltage
        } else {
            UnknownKind::Current
        }
    }

    /// Nodes attached to a voltage source start at half its value, other
    /// nodes at 0 V. Branch currents start small and non-zero.
    fn initial_guess(&self) -> Vec<f64> {
        let a = &self.equation.admittances;
        let n = self.equation.num_node_rows();
        let size = self.equation.size();
        let mut x = vec![0.0; size];
        let mut seeded = vec![false; n];

        for row in n..size {
            x[row] = INITIAL_BRANCH_CURRENT;
            let v = self.equation.inputs[row];
            if v == 0.0 {
                continue;
            }
            for col in 0..n {
                let coupling = a.get(row, col);
                if !seeded[col] && (coupling == 1.0 || coupling == -1.0) {
                    x[col] = 0.5 * v * coupling;
                    seeded[col] = true;
                }
            }
        }
        x
    }
}
